//! Peer-to-peer layer for gossipchain.
//!
//! - **PeerNode**: handshakes, bootstrap, transaction and block gossip, the validator loop
//! - **Registry**: the peer table, owned by one task
//! - **Transport**: the client/handler seam, with in-memory and TCP implementations
//!
//! # Example
//!
//! ```rust,no_run
//! use gossipchain_chain::Blockchain;
//! use gossipchain_node::{serve, NodeConfig, PeerNode, TcpTransport};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = NodeConfig::new("127.0.0.1:3000");
//! let transport = Arc::new(TcpTransport::new(config.request_timeout()));
//! let chain = Arc::new(Blockchain::in_memory()?);
//! let node = PeerNode::new(config.clone(), chain, transport, None);
//!
//! let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
//! node.bootstrap_network(vec!["127.0.0.1:4000".into()]).await?;
//! serve(listener, node).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod message;
pub mod node;
pub mod registry;
pub mod tcp;
pub mod transport;

// Re-export commonly used types
pub use config::{ConfigError, NodeConfig};
pub use message::{Announcement, Message, Reply};
pub use node::{NodeError, PeerNode};
pub use registry::{Peer, PeerRegistry};
pub use tcp::{serve, TcpTransport};
pub use transport::{MemoryNetwork, PeerClient, RequestHandler, Transport, TransportError};
