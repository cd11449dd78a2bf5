//! sled-backed store with serialization helpers.

use crate::store::{BlockStore, BlockWriter, Result, StorageError, TransactionStore, UtxoStore};
use gossipchain_core::{Address, Block, Hash, OutPoint, Transaction, Utxo};
use sled::Db;
use std::path::Path;

/// A persistent store implementing every store capability over one sled database.
pub struct SledStore {
    db: Db,
}

impl SledStore {
    /// Open a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open an in-memory database (for testing).
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Store a serializable value.
    fn put_value<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: serde::Serialize,
    {
        let encoded = bincode::serialize(value)?;
        self.db.insert(key, encoded)?;
        Ok(())
    }

    /// Retrieve and deserialize a value.
    fn get_value<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: serde::de::DeserializeOwned,
    {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // =========================================================================
    // Key Construction Helpers
    // =========================================================================

    /// Format: "block:hash:" + hash_bytes
    pub fn block_key(hash: &Hash) -> Vec<u8> {
        let mut key = b"block:hash:".to_vec();
        key.extend_from_slice(&hash.0);
        key
    }

    /// Format: "tx:" + hash_bytes
    pub fn tx_key(hash: &Hash) -> Vec<u8> {
        let mut key = b"tx:".to_vec();
        key.extend_from_slice(&hash.0);
        key
    }

    /// Format: "utxo:" + tx_hash_bytes + big-endian output index
    pub fn utxo_key(outpoint: &OutPoint) -> Vec<u8> {
        let mut key = b"utxo:".to_vec();
        key.extend_from_slice(&outpoint.tx_hash.0);
        key.extend_from_slice(&outpoint.index.to_be_bytes());
        key
    }
}

impl BlockStore for SledStore {
    fn put(&self, block: &Block) -> Result<()> {
        self.put_value(Self::block_key(&block.hash()), block)
    }

    fn get(&self, hash: &Hash) -> Result<Block> {
        self.get_value(Self::block_key(hash))?
            .ok_or_else(|| StorageError::NotFound(format!("block {}", hash)))
    }

    fn contains(&self, hash: &Hash) -> Result<bool> {
        Ok(self.db.contains_key(Self::block_key(hash))?)
    }
}

impl TransactionStore for SledStore {
    fn put(&self, tx: &Transaction) -> Result<()> {
        self.put_value(Self::tx_key(&tx.hash()), tx)
    }

    fn get(&self, hash: &Hash) -> Result<Transaction> {
        self.get_value(Self::tx_key(hash))?
            .ok_or_else(|| StorageError::NotFound(format!("transaction {}", hash)))
    }
}

impl UtxoStore for SledStore {
    fn put(&self, utxo: &Utxo) -> Result<()> {
        self.put_value(Self::utxo_key(&utxo.outpoint), utxo)
    }

    fn get(&self, outpoint: &OutPoint) -> Result<Utxo> {
        self.get_value(Self::utxo_key(outpoint))?
            .ok_or_else(|| StorageError::NotFound(format!("utxo {}", outpoint)))
    }

    fn unspent_for(&self, address: &Address) -> Result<Vec<Utxo>> {
        let mut found = Vec::new();
        for entry in self.db.scan_prefix(b"utxo:") {
            let (_, bytes) = entry?;
            let utxo: Utxo = bincode::deserialize(&bytes)?;
            if !utxo.spent && utxo.address == *address {
                found.push(utxo);
            }
        }
        Ok(found)
    }
}

impl BlockWriter for SledStore {
    /// Transactions, UTXO changes and the block go into one sled batch.
    fn write_block(&self, block: &Block, utxos: &[Utxo]) -> Result<()> {
        let mut batch = sled::Batch::default();
        for tx in &block.transactions {
            batch.insert(Self::tx_key(&tx.hash()), bincode::serialize(tx)?);
        }
        for utxo in utxos {
            batch.insert(Self::utxo_key(&utxo.outpoint), bincode::serialize(utxo)?);
        }
        batch.insert(Self::block_key(&block.hash()), bincode::serialize(block)?);
        self.db.apply_batch(batch)?;
        Ok(())
    }
}
