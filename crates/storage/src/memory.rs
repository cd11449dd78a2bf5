//! In-memory store backends.

use crate::store::{BlockStore, BlockWriter, Result, StorageError, TransactionStore, UtxoStore};
use gossipchain_core::{Address, Block, Hash, OutPoint, Transaction, Utxo};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Blocks held in a hash map.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Hash, Block>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl BlockStore for MemoryBlockStore {
    fn put(&self, block: &Block) -> Result<()> {
        self.blocks.write().insert(block.hash(), block.clone());
        Ok(())
    }

    fn get(&self, hash: &Hash) -> Result<Block> {
        self.blocks
            .read()
            .get(hash)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("block {}", hash)))
    }

    fn contains(&self, hash: &Hash) -> Result<bool> {
        Ok(self.blocks.read().contains_key(hash))
    }
}

/// Transactions held in a hash map.
#[derive(Default)]
pub struct MemoryTxStore {
    transactions: RwLock<HashMap<Hash, Transaction>>,
}

impl MemoryTxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transactions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.read().is_empty()
    }
}

impl TransactionStore for MemoryTxStore {
    fn put(&self, tx: &Transaction) -> Result<()> {
        self.transactions.write().insert(tx.hash(), tx.clone());
        Ok(())
    }

    fn get(&self, hash: &Hash) -> Result<Transaction> {
        self.transactions
            .read()
            .get(hash)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("transaction {}", hash)))
    }
}

/// UTXO entries held in a hash map.
#[derive(Default)]
pub struct MemoryUtxoStore {
    utxos: RwLock<HashMap<OutPoint, Utxo>>,
}

impl MemoryUtxoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.utxos.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.read().is_empty()
    }
}

impl UtxoStore for MemoryUtxoStore {
    fn put(&self, utxo: &Utxo) -> Result<()> {
        self.utxos.write().insert(utxo.outpoint, utxo.clone());
        Ok(())
    }

    fn get(&self, outpoint: &OutPoint) -> Result<Utxo> {
        self.utxos
            .read()
            .get(outpoint)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("utxo {}", outpoint)))
    }

    fn unspent_for(&self, address: &Address) -> Result<Vec<Utxo>> {
        let mut found: Vec<Utxo> = self
            .utxos
            .read()
            .values()
            .filter(|u| !u.spent && u.address == *address)
            .cloned()
            .collect();
        found.sort_by_key(|u| u.outpoint);
        Ok(found)
    }
}

/// Commits blocks to the three in-memory stores while holding all of their write locks,
/// so readers never observe half a block.
pub struct MemoryWriter {
    blocks: Arc<MemoryBlockStore>,
    transactions: Arc<MemoryTxStore>,
    utxos: Arc<MemoryUtxoStore>,
}

impl MemoryWriter {
    pub fn new(
        blocks: Arc<MemoryBlockStore>,
        transactions: Arc<MemoryTxStore>,
        utxos: Arc<MemoryUtxoStore>,
    ) -> Self {
        Self {
            blocks,
            transactions,
            utxos,
        }
    }
}

impl BlockWriter for MemoryWriter {
    fn write_block(&self, block: &Block, utxos: &[Utxo]) -> Result<()> {
        // Lock order: transactions, utxos, blocks.
        let mut tx_map = self.transactions.transactions.write();
        let mut utxo_map = self.utxos.utxos.write();
        let mut block_map = self.blocks.blocks.write();

        for tx in &block.transactions {
            tx_map.insert(tx.hash(), tx.clone());
        }
        for utxo in utxos {
            utxo_map.insert(utxo.outpoint, utxo.clone());
        }
        block_map.insert(block.hash(), block.clone());
        Ok(())
    }
}
