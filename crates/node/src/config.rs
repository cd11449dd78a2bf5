//! Node configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings for one peer node. Missing JSON fields fall back to [`NodeConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Version string announced in handshakes.
    pub version: String,
    /// Address this node listens on and announces to peers.
    pub listen_addr: String,
    /// Validator tick interval in milliseconds.
    pub block_time_ms: u64,
    /// Deadline for a single outbound request in milliseconds.
    pub request_timeout_ms: u64,
    /// Upper bound on connected peers.
    pub max_peers: usize,
    /// Dials in flight at once while bootstrapping.
    pub bootstrap_concurrency: usize,
    /// Transactions per produced block; the rest wait for the next tick.
    pub max_block_transactions: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            version: "gossipchain-0.1".to_string(),
            listen_addr: "127.0.0.1:3000".to_string(),
            block_time_ms: 5_000,
            request_timeout_ms: 3_000,
            max_peers: 32,
            bootstrap_concurrency: 4,
            max_block_transactions: 1_000,
        }
    }
}

impl NodeConfig {
    /// Default settings listening on `listen_addr`.
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            ..Self::default()
        }
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
