//! Storage layer for gossipchain.
//!
//! The chain depends only on three capabilities:
//! - [`BlockStore`]: blocks by hash
//! - [`TransactionStore`]: transactions by hash
//! - [`UtxoStore`]: the UTXO set, keyed by outpoint
//!
//! A [`BlockWriter`] commits a validated block to all three at once.
//!
//! Each comes in two variants: in-memory (`Memory*`) and persistent ([`SledStore`], one sled
//! database serving all three). [`Stores`] bundles a chosen set as trait objects.
//!
//! # Example
//!
//! ```rust,no_run
//! use gossipchain_storage::{SledStore, Stores};
//!
//! let in_memory = Stores::memory();
//! let on_disk = Stores::sled(SledStore::open("./ledger_data").unwrap());
//! ```

pub mod db;
pub mod memory;
pub mod store;

// Re-export commonly used types
pub use db::SledStore;
pub use memory::{MemoryBlockStore, MemoryTxStore, MemoryUtxoStore, MemoryWriter};
pub use store::{
    BlockStore, BlockWriter, Result, StorageError, Stores, TransactionStore, UtxoStore,
};
