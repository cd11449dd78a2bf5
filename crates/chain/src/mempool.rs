//! Transaction mempool for pending transactions.
//!
//! The mempool holds transactions admitted from peers until the next block drains it.
//! Admission only deduplicates; validation happens when a block is assembled.

use gossipchain_core::{Block, Hash, Transaction};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
struct Pool {
    /// Transactions indexed by hash.
    transactions: HashMap<Hash, Transaction>,
    /// Hashes in admission order.
    order: VecDeque<Hash>,
}

/// Transaction mempool, shared between the network handlers and the validator loop.
#[derive(Debug, Default)]
pub struct Mempool {
    pool: RwLock<Pool>,
}

impl Mempool {
    /// Create an empty mempool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a transaction.
    ///
    /// Returns `false` if a transaction with the same hash is already pending.
    pub fn add(&self, tx: Transaction) -> bool {
        let tx_hash = tx.hash();
        let mut pool = self.pool.write();
        if pool.transactions.contains_key(&tx_hash) {
            return false;
        }
        pool.order.push_back(tx_hash);
        pool.transactions.insert(tx_hash, tx);
        true
    }

    /// Check if a transaction is pending.
    pub fn has(&self, tx: &Transaction) -> bool {
        self.contains(&tx.hash())
    }

    /// Check if a transaction hash is pending.
    pub fn contains(&self, tx_hash: &Hash) -> bool {
        self.pool.read().transactions.contains_key(tx_hash)
    }

    /// Get the number of pending transactions.
    pub fn len(&self) -> usize {
        self.pool.read().transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.read().transactions.is_empty()
    }

    /// Copy of every pending transaction, oldest first.
    pub fn pending(&self) -> Vec<Transaction> {
        let pool = self.pool.read();
        pool.order
            .iter()
            .filter_map(|hash| pool.transactions.get(hash).cloned())
            .collect()
    }

    /// Drain every pending transaction, oldest first.
    pub fn clear(&self) -> Vec<Transaction> {
        let mut pool = self.pool.write();
        let Pool {
            transactions,
            order,
        } = &mut *pool;
        order
            .drain(..)
            .filter_map(|hash| transactions.remove(&hash))
            .collect()
    }

    /// Put transactions taken by [`Mempool::clear`] back at the front of the queue, in the given
    /// order. Ones that were re-admitted in the meantime are skipped. Returns how many were
    /// restored.
    pub fn requeue(&self, txs: Vec<Transaction>) -> usize {
        let mut pool = self.pool.write();
        let mut restored = Vec::with_capacity(txs.len());
        for tx in txs {
            let tx_hash = tx.hash();
            if pool.transactions.contains_key(&tx_hash) {
                continue;
            }
            pool.transactions.insert(tx_hash, tx);
            restored.push(tx_hash);
        }
        let count = restored.len();
        for tx_hash in restored.into_iter().rev() {
            pool.order.push_front(tx_hash);
        }
        count
    }

    /// Keep only the pending transactions for which `keep` returns `true`.
    /// Returns how many were dropped.
    pub fn retain(&self, mut keep: impl FnMut(&Transaction) -> bool) -> usize {
        let mut pool = self.pool.write();
        let before = pool.transactions.len();
        let Pool {
            transactions,
            order,
        } = &mut *pool;
        transactions.retain(|_, tx| keep(tx));
        order.retain(|hash| transactions.contains_key(hash));
        before - transactions.len()
    }

    /// Drop any pending transaction included in `block`. Returns how many were removed.
    pub fn remove_included(&self, block: &Block) -> usize {
        let mut pool = self.pool.write();
        let mut removed = 0;
        for tx in &block.transactions {
            if pool.transactions.remove(&tx.hash()).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            let Pool {
                transactions,
                order,
            } = &mut *pool;
            order.retain(|hash| transactions.contains_key(hash));
        }
        removed
    }
}
