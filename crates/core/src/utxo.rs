//! Unspent transaction outputs.

use crate::crypto::Address;
use crate::hash::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one output: the creating transaction's hash and the output position.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(tx_hash: Hash, index: u32) -> Self {
        Self { tx_hash, index }
    }
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutPoint({}:{})", &self.tx_hash.to_hex()[..8], self.index)
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.index)
    }
}

/// A ledger entry for one output. Entries are flagged spent, never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub amount: u64,
    /// Recipient recorded on the output.
    pub address: Address,
    pub spent: bool,
}

impl Utxo {
    /// Create an unspent entry.
    pub fn new(outpoint: OutPoint, amount: u64, address: Address) -> Self {
        Self {
            outpoint,
            amount,
            address,
            spent: false,
        }
    }

    /// Copy of this entry flagged as spent.
    pub fn into_spent(mut self) -> Self {
        self.spent = true;
        self
    }
}
