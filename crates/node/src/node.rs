//! A peer on the gossip network.

use crate::config::NodeConfig;
use crate::message::{Announcement, Message, Reply};
use crate::registry::{Peer, PeerRegistry};
use crate::transport::{PeerClient, RequestHandler, Transport, TransportError};
use futures::future::{join_all, BoxFuture};
use futures::stream::{self, StreamExt};
use gossipchain_chain::{BlockProducer, Blockchain, ChainError, Mempool, Production};
use gossipchain_core::{Block, Hash, Keypair, Transaction};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Errors that can occur while running a node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("peer registry has shut down")]
    RegistryClosed,

    #[error("node has no validator key")]
    NotValidator,
}

pub type Result<T> = std::result::Result<T, NodeError>;

/// A node: shared chain, its own mempool, a peer table and an optional validator key.
pub struct PeerNode {
    config: NodeConfig,
    chain: Arc<Blockchain>,
    mempool: Mempool,
    registry: PeerRegistry,
    transport: Arc<dyn Transport>,
    producer: Option<BlockProducer>,
}

impl PeerNode {
    /// Create a node. Must be called from within a tokio runtime.
    pub fn new(
        config: NodeConfig,
        chain: Arc<Blockchain>,
        transport: Arc<dyn Transport>,
        validator: Option<Keypair>,
    ) -> Arc<Self> {
        let registry = PeerRegistry::spawn(config.max_peers);
        let producer = validator.map(|key| BlockProducer::new(key, config.max_block_transactions));
        Arc::new(Self {
            config,
            chain,
            mempool: Mempool::new(),
            registry,
            transport,
            producer,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<Blockchain> {
        &self.chain
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn is_validator(&self) -> bool {
        self.producer.is_some()
    }

    /// Listen addresses of connected peers.
    pub async fn peer_addresses(&self) -> Result<Vec<String>> {
        self.registry.addresses().await
    }

    /// This node's view of itself, as sent in handshakes.
    pub async fn announcement(&self) -> Result<Announcement> {
        Ok(Announcement {
            version: self.config.version.clone(),
            height: self.chain.height(),
            listen_addr: self.config.listen_addr.clone(),
            peers: self.registry.addresses().await?,
        })
    }

    /// Answer an inbound handshake: dial the remote back, record it and reply with our own
    /// announcement. Peers the remote knows about are bootstrapped in the background.
    pub async fn handshake(self: &Arc<Self>, remote: Announcement) -> Result<Announcement> {
        if remote.listen_addr == self.config.listen_addr {
            return self.announcement().await;
        }
        let client = self.transport.dial(&remote.listen_addr).await?;
        let peers = remote.peers.clone();
        let addr = remote.listen_addr.clone();
        self.registry
            .add(
                addr,
                Peer {
                    client,
                    announcement: remote,
                },
            )
            .await?;

        if !peers.is_empty() {
            let node = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(err) = node.bootstrap_network(peers).await {
                    warn!(error = %err, "bootstrap from handshake failed");
                }
            });
        }

        self.announcement().await
    }

    /// Connect to `addrs` and, transitively, to every peer they announce.
    ///
    /// Addresses are dialed at most once each, at most `bootstrap_concurrency` at a time.
    /// A failed dial is logged and skipped. Returns the number of new peers.
    pub async fn bootstrap_network(self: &Arc<Self>, addrs: Vec<String>) -> Result<usize> {
        let mut visited: HashSet<String> = self.registry.addresses().await?.into_iter().collect();
        visited.insert(self.config.listen_addr.clone());

        let mut queue: VecDeque<String> = addrs
            .into_iter()
            .filter(|addr| visited.insert(addr.clone()))
            .collect();
        let concurrency = self.config.bootstrap_concurrency.max(1);
        let mut connected = 0;

        while !queue.is_empty() {
            let round: Vec<String> = queue.drain(..).collect();
            let results: Vec<_> = stream::iter(round)
                .map(|addr| async move {
                    let result = self.dial_remote(&addr).await;
                    (addr, result)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

            for (addr, result) in results {
                let (client, announcement) = match result {
                    Ok(dialed) => dialed,
                    Err(err) => {
                        warn!(remote = %addr, error = %err, "failed to dial remote node");
                        continue;
                    }
                };

                // Peers are keyed by the address they announce, whatever we dialed.
                let key = announcement.listen_addr.clone();
                if key == self.config.listen_addr {
                    debug!(remote = %addr, "dialed ourselves");
                    continue;
                }
                visited.insert(key.clone());
                for learned in &announcement.peers {
                    if visited.insert(learned.clone()) {
                        queue.push_back(learned.clone());
                    }
                }
                let peer = Peer {
                    client,
                    announcement,
                };
                if self.registry.add(key, peer).await? {
                    connected += 1;
                }
            }
        }

        Ok(connected)
    }

    async fn dial_remote(&self, addr: &str) -> Result<(Arc<dyn PeerClient>, Announcement)> {
        info!(we = %self.config.listen_addr, remote = %addr, "dialing remote node");
        let client = self.transport.dial(addr).await?;
        let announcement = client.handshake(self.announcement().await?).await?;
        Ok((client, announcement))
    }

    /// Admit a transaction. Only newly admitted transactions are relayed to peers.
    pub async fn handle_transaction(self: &Arc<Self>, tx: Transaction) -> Result<bool> {
        let hash = tx.hash();
        if !self.mempool.add(tx.clone()) {
            debug!(tx = %hash, "transaction already pending");
            return Ok(false);
        }
        info!(we = %self.config.listen_addr, tx = %hash, "received transaction");
        self.spawn_broadcast(Message::Transaction(tx));
        Ok(true)
    }

    /// Apply a block received from a peer and relay it if it was new to us.
    pub async fn handle_block(self: &Arc<Self>, block: Block) -> Result<bool> {
        let hash = block.hash();
        if self.chain.has_block(&hash)? {
            return Ok(false);
        }
        if let Err(err) = self.chain.add_block(block.clone()) {
            // Lost a race with another copy of the same block.
            if self.chain.has_block(&hash)? {
                return Ok(false);
            }
            return Err(err.into());
        }

        let removed = self.mempool.remove_included(&block);
        let evicted = self.evict_invalid();
        info!(
            we = %self.config.listen_addr,
            block = %hash,
            height = self.chain.height(),
            removed,
            evicted,
            "accepted block"
        );
        self.spawn_broadcast(Message::Block(block));
        Ok(true)
    }

    /// Drop pending transactions that no longer apply on top of the head, such as ones that
    /// conflict with a block just accepted. Pending transactions are checked in admission order,
    /// so one spending the output of an earlier pending transaction survives.
    fn evict_invalid(&self) -> usize {
        let selection = self
            .chain
            .select_transactions(self.mempool.pending(), usize::MAX);
        if selection.rejected.is_empty() {
            return 0;
        }
        let stale: HashSet<Hash> = selection
            .rejected
            .iter()
            .map(|(tx, err)| {
                debug!(tx = %tx.hash(), error = %err, "evicting pending transaction");
                tx.hash()
            })
            .collect();
        self.mempool.retain(|tx| !stale.contains(&tx.hash()))
    }

    fn spawn_broadcast(self: &Arc<Self>, message: Message) {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = node.broadcast(message).await {
                warn!(error = %err, "broadcast failed");
            }
        });
    }

    /// Send `message` to every connected peer. Per-peer failures are logged, not returned;
    /// peers that cannot be reached at all are dropped from the table.
    ///
    /// Returns how many peers acknowledged it.
    pub async fn broadcast(&self, message: Message) -> Result<usize> {
        let peers = self.registry.snapshot().await?;
        let kind = message.type_name();

        let replies = join_all(peers.iter().map(|peer| {
            let message = message.clone();
            async move {
                let addr = &peer.announcement.listen_addr;
                (addr, peer.client.request(message).await)
            }
        }))
        .await;

        let mut delivered = 0;
        for (addr, reply) in replies {
            match reply {
                Ok(Reply::Error(err)) => {
                    debug!(peer = %addr, message = kind, error = %err, "peer refused message")
                }
                Ok(_) => delivered += 1,
                Err(err) if err.is_disconnect() => {
                    warn!(peer = %addr, message = kind, error = %err, "peer disconnected");
                    self.registry.remove(addr.clone()).await?;
                }
                Err(err) => warn!(peer = %addr, message = kind, error = %err, "broadcast error"),
            }
        }
        Ok(delivered)
    }

    /// Run one validator round: drain the mempool, commit a block and announce it.
    ///
    /// Deferred transactions go back to the front of the mempool. If the block cannot be
    /// committed, its transactions go back as well, ahead of the deferred ones.
    pub async fn produce_block(&self) -> Result<Production> {
        let producer = self.producer.as_ref().ok_or(NodeError::NotValidator)?;

        let pending = self.mempool.clear();
        info!(txs = pending.len(), "time to create a new block");
        let production = producer.assemble(&self.chain, pending);
        if let Err(err) = producer.commit(&self.chain, &production) {
            let mut unused = production.block.transactions;
            unused.extend(production.deferred);
            let restored = self.mempool.requeue(unused);
            warn!(error = %err, restored, "block not committed, transactions kept");
            return Err(err.into());
        }
        self.mempool.requeue(production.deferred.clone());

        self.broadcast(Message::Block(production.block.clone()))
            .await?;
        Ok(production)
    }

    /// Produce a block every `block_time` until `shutdown` flips to `true`.
    ///
    /// A round in progress always completes; shutdown is only observed between ticks.
    pub async fn run_validator(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let producer = self.producer.as_ref().ok_or(NodeError::NotValidator)?;
        info!(
            pubkey = %producer.keypair().public_key,
            block_time = ?self.config.block_time(),
            "starting validator loop"
        );

        let mut ticker = tokio::time::interval(self.config.block_time());
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(err) = self.produce_block().await {
                warn!(error = %err, "failed to produce block");
            }
        }

        info!("validator loop stopped");
        Ok(())
    }
}

impl RequestHandler for PeerNode {
    fn handle_request(self: Arc<Self>, message: Message) -> BoxFuture<'static, Reply> {
        Box::pin(async move {
            let result = match message {
                Message::Handshake(remote) => self.handshake(remote).await.map(Reply::Announcement),
                Message::Transaction(tx) => self.handle_transaction(tx).await.map(|_| Reply::Ack),
                Message::Block(block) => self.handle_block(block).await.map(|_| Reply::Ack),
            };
            result.unwrap_or_else(|err| Reply::Error(err.to_string()))
        })
    }
}
