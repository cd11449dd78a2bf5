//! Ledger rules for gossipchain.
//!
//! This crate owns everything that decides what the ledger looks like:
//! - **Blockchain**: header history, block and transaction validation, UTXO bookkeeping
//! - **Mempool**: deduplicated pool of transactions awaiting a block
//! - **Producer**: block assembly for the validator
//! - **Genesis**: the well-known first block
//!
//! # Example
//!
//! ```rust
//! use gossipchain_chain::{Blockchain, BlockProducer, Mempool};
//! use gossipchain_core::Keypair;
//!
//! let chain = Blockchain::in_memory().unwrap();
//! let mempool = Mempool::new();
//! let producer = BlockProducer::new(Keypair::generate(), 100);
//!
//! producer.produce(&chain, mempool.clear()).unwrap();
//! assert_eq!(chain.height(), 1);
//! ```

pub mod blockchain;
pub mod genesis;
pub mod mempool;
pub mod producer;

// Re-export commonly used types
pub use blockchain::{Blockchain, ChainConfig, ChainError, Selection};
pub use genesis::{genesis_address, genesis_block, genesis_keypair, GENESIS_AMOUNT, GENESIS_SEED};
pub use mempool::Mempool;
pub use producer::{BlockProducer, Production};
