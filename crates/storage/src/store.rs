//! Store capabilities the chain depends on.

use crate::db::SledStore;
use crate::memory::{MemoryBlockStore, MemoryTxStore, MemoryUtxoStore, MemoryWriter};
use gossipchain_core::{Address, Block, Hash, OutPoint, Transaction, Utxo};
use std::sync::Arc;
use thiserror::Error;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Key not found: {0}")]
    NotFound(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Content-addressed block persistence, keyed by block hash.
pub trait BlockStore: Send + Sync {
    fn put(&self, block: &Block) -> Result<()>;

    /// Fails with [`StorageError::NotFound`] if absent.
    fn get(&self, hash: &Hash) -> Result<Block>;

    fn contains(&self, hash: &Hash) -> Result<bool>;
}

/// Content-addressed transaction persistence, keyed by transaction hash.
pub trait TransactionStore: Send + Sync {
    fn put(&self, tx: &Transaction) -> Result<()>;

    /// Fails with [`StorageError::NotFound`] if absent.
    fn get(&self, hash: &Hash) -> Result<Transaction>;
}

/// The UTXO set. Entries are inserted or overwritten, never deleted.
pub trait UtxoStore: Send + Sync {
    fn put(&self, utxo: &Utxo) -> Result<()>;

    /// Fails with [`StorageError::NotFound`] if absent.
    fn get(&self, outpoint: &OutPoint) -> Result<Utxo>;

    /// All unspent entries recorded for `address`.
    fn unspent_for(&self, address: &Address) -> Result<Vec<Utxo>>;
}

/// Persists everything a validated block changes as one unit.
pub trait BlockWriter: Send + Sync {
    /// Write the block's transactions, the UTXO changes and the block itself.
    ///
    /// Either every write lands or none does.
    fn write_block(&self, block: &Block, utxos: &[Utxo]) -> Result<()>;
}

/// The three stores a chain is built on, as trait objects, plus the writer that commits
/// blocks to all of them.
#[derive(Clone)]
pub struct Stores {
    pub blocks: Arc<dyn BlockStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub utxos: Arc<dyn UtxoStore>,
    pub writer: Arc<dyn BlockWriter>,
}

impl Stores {
    /// Fresh in-memory backends.
    pub fn memory() -> Self {
        let blocks = Arc::new(MemoryBlockStore::new());
        let transactions = Arc::new(MemoryTxStore::new());
        let utxos = Arc::new(MemoryUtxoStore::new());
        let writer = Arc::new(MemoryWriter::new(
            blocks.clone(),
            transactions.clone(),
            utxos.clone(),
        ));
        Self {
            blocks,
            transactions,
            utxos,
            writer,
        }
    }

    /// All capabilities served by one sled database.
    pub fn sled(store: SledStore) -> Self {
        let store = Arc::new(store);
        Self {
            blocks: store.clone(),
            transactions: store.clone(),
            utxos: store.clone(),
            writer: store,
        }
    }

    /// Commit a validated block through [`BlockWriter::write_block`].
    pub fn commit(&self, block: &Block, utxos: &[Utxo]) -> Result<()> {
        self.writer.write_block(block, utxos)
    }
}
