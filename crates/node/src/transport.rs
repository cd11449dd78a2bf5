//! How peers reach each other.
//!
//! A [`Transport`] turns an address into a [`PeerClient`]; a [`RequestHandler`] answers the
//! requests a client sends. [`MemoryNetwork`] wires both together in-process; the TCP
//! implementation lives in [`crate::tcp`].

use crate::message::{Announcement, Message, Reply};
use futures::future::BoxFuture;
use gossipchain_core::{Block, Transaction};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while talking to a peer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("peer {0} is unreachable")]
    Unreachable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("unexpected reply to {0}")]
    UnexpectedReply(&'static str),
}

impl TransportError {
    /// Whether the peer could not be reached at all, as opposed to answering badly.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout | TransportError::Unreachable(_) | TransportError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A connection to one remote peer.
pub trait PeerClient: Send + Sync {
    /// The address this client was dialed with.
    fn addr(&self) -> &str;

    /// Send one request and wait for its reply.
    fn request(&self, message: Message) -> BoxFuture<'_, Result<Reply>>;
}

impl dyn PeerClient {
    pub async fn handshake(&self, announcement: Announcement) -> Result<Announcement> {
        match self.request(Message::Handshake(announcement)).await? {
            Reply::Announcement(remote) => Ok(remote),
            Reply::Error(err) => Err(TransportError::Remote(err)),
            Reply::Ack => Err(TransportError::UnexpectedReply("handshake")),
        }
    }

    pub async fn handle_transaction(&self, tx: Transaction) -> Result<()> {
        expect_ack(self.request(Message::Transaction(tx)).await?, "transaction")
    }

    pub async fn handle_block(&self, block: Block) -> Result<()> {
        expect_ack(self.request(Message::Block(block)).await?, "block")
    }
}

fn expect_ack(reply: Reply, request: &'static str) -> Result<()> {
    match reply {
        Reply::Ack => Ok(()),
        Reply::Error(err) => Err(TransportError::Remote(err)),
        Reply::Announcement(_) => Err(TransportError::UnexpectedReply(request)),
    }
}

/// Opens clients to remote peers.
pub trait Transport: Send + Sync {
    fn dial<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<Arc<dyn PeerClient>>>;
}

/// Server side of the protocol: answers one request.
pub trait RequestHandler: Send + Sync {
    fn handle_request(self: Arc<Self>, message: Message) -> BoxFuture<'static, Reply>;
}

/// In-process network. Every node registered under an address is reachable by that address.
#[derive(Clone)]
pub struct MemoryNetwork {
    nodes: Arc<RwLock<HashMap<String, Weak<dyn RequestHandler>>>>,
    request_timeout: Duration,
}

impl MemoryNetwork {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            nodes: Arc::default(),
            request_timeout,
        }
    }

    /// Make `handler` reachable at `addr`. The network only keeps a weak reference.
    pub fn register(&self, addr: impl Into<String>, handler: &Arc<dyn RequestHandler>) {
        self.nodes.write().insert(addr.into(), Arc::downgrade(handler));
    }

    /// Take `addr` off the network; requests to it fail as unreachable from now on.
    pub fn unregister(&self, addr: &str) {
        self.nodes.write().remove(addr);
    }

    fn lookup(&self, addr: &str) -> Result<Arc<dyn RequestHandler>> {
        self.nodes
            .read()
            .get(addr)
            .and_then(Weak::upgrade)
            .ok_or_else(|| TransportError::Unreachable(addr.to_string()))
    }
}

impl Transport for MemoryNetwork {
    fn dial<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<Arc<dyn PeerClient>>> {
        Box::pin(async move {
            self.lookup(addr)?;
            let client: Arc<dyn PeerClient> = Arc::new(MemoryClient {
                addr: addr.to_string(),
                network: self.clone(),
            });
            Ok(client)
        })
    }
}

struct MemoryClient {
    addr: String,
    network: MemoryNetwork,
}

impl PeerClient for MemoryClient {
    fn addr(&self) -> &str {
        &self.addr
    }

    fn request(&self, message: Message) -> BoxFuture<'_, Result<Reply>> {
        Box::pin(async move {
            let handler = self.network.lookup(&self.addr)?;
            // Runs to completion on its own task, like a remote server would.
            let task = tokio::spawn(handler.handle_request(message));
            match tokio::time::timeout(self.network.request_timeout, task).await {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(err)) => Err(TransportError::Remote(err.to_string())),
                Err(_) => Err(TransportError::Timeout),
            }
        })
    }
}
