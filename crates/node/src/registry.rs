//! Peer table owned by a single task.
//!
//! Callers talk to the table through [`PeerRegistry`], a cheap handle that sends commands over a
//! channel and waits for the answer, so no lock is ever held across network I/O.

use crate::message::Announcement;
use crate::node::NodeError;
use crate::transport::PeerClient;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// A connected peer.
#[derive(Clone)]
pub struct Peer {
    pub client: Arc<dyn PeerClient>,
    pub announcement: Announcement,
}

enum Command {
    Add {
        addr: String,
        peer: Peer,
        reply: oneshot::Sender<bool>,
    },
    Remove {
        addr: String,
    },
    Contains {
        addr: String,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<Peer>>,
    },
    Addresses {
        reply: oneshot::Sender<Vec<String>>,
    },
}

/// Handle to the peer table task.
#[derive(Clone)]
pub struct PeerRegistry {
    commands: mpsc::Sender<Command>,
}

impl PeerRegistry {
    /// Spawn the table task on the current runtime. It stops once every handle is dropped.
    pub fn spawn(max_peers: usize) -> Self {
        let (commands, receiver) = mpsc::channel(64);
        tokio::spawn(run(receiver, max_peers));
        Self { commands }
    }

    /// Record a peer under its listen address.
    ///
    /// Returns `false` if the address is already known or the table is full.
    pub async fn add(&self, addr: String, peer: Peer) -> Result<bool, NodeError> {
        self.ask(|reply| Command::Add { addr, peer, reply }).await
    }

    pub async fn remove(&self, addr: String) -> Result<(), NodeError> {
        self.commands
            .send(Command::Remove { addr })
            .await
            .map_err(|_| NodeError::RegistryClosed)
    }

    pub async fn contains(&self, addr: String) -> Result<bool, NodeError> {
        self.ask(|reply| Command::Contains { addr, reply }).await
    }

    /// Current peers. The result may be stale by the time it is used.
    pub async fn snapshot(&self) -> Result<Vec<Peer>, NodeError> {
        self.ask(|reply| Command::Snapshot { reply }).await
    }

    /// Listen addresses of the current peers.
    pub async fn addresses(&self) -> Result<Vec<String>, NodeError> {
        self.ask(|reply| Command::Addresses { reply }).await
    }

    async fn ask<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, NodeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| NodeError::RegistryClosed)?;
        response.await.map_err(|_| NodeError::RegistryClosed)
    }
}

async fn run(mut commands: mpsc::Receiver<Command>, max_peers: usize) {
    let mut peers: BTreeMap<String, Peer> = BTreeMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Add { addr, peer, reply } => {
                let added = !peers.contains_key(&addr) && peers.len() < max_peers;
                if added {
                    info!(
                        peer = %addr,
                        height = peer.announcement.height,
                        version = %peer.announcement.version,
                        "new peer connected"
                    );
                    peers.insert(addr, peer);
                } else {
                    debug!(peer = %addr, "peer not added");
                }
                let _ = reply.send(added);
            }
            Command::Remove { addr } => {
                if peers.remove(&addr).is_some() {
                    info!(peer = %addr, "peer removed");
                }
            }
            Command::Contains { addr, reply } => {
                let _ = reply.send(peers.contains_key(&addr));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(peers.values().cloned().collect());
            }
            Command::Addresses { reply } => {
                let _ = reply.send(peers.keys().cloned().collect());
            }
        }
    }
}
