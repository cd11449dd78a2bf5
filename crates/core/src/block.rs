//! Block and block header structures.

use crate::crypto::{Keypair, PublicKey, Signature};
use crate::hash::{hash_encoded, Hash};
use crate::merkle::MerkleTree;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// Current block format version.
pub const BLOCK_VERSION: u32 = 1;

/// The header of a block. Its hash is the block hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: u32,
    /// Hash of the previous block (zero for genesis).
    pub prev_hash: Hash,
    /// Merkle root of the transaction hashes; zero when the block carries none.
    pub root_hash: Hash,
}

impl Header {
    /// Calculate the hash of this block header.
    pub fn hash(&self) -> Hash {
        hash_encoded(self)
    }
}

/// Build the merkle tree over the hashes of `transactions`, in order.
pub fn merkle_tree(transactions: &[Transaction]) -> MerkleTree {
    let leaves: Vec<Hash> = transactions.iter().map(Transaction::hash).collect();
    MerkleTree::new(&leaves)
}

/// Compute the merkle root over the hashes of `transactions`, in order.
pub fn compute_merkle_root(transactions: &[Transaction]) -> Hash {
    merkle_tree(transactions).root()
}

/// A complete block including header, transactions, and the signer's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
    /// Key of the signer; set by [`Block::sign`].
    pub public_key: Option<PublicKey>,
    /// Signature over the header hash; set by [`Block::sign`].
    pub signature: Option<Signature>,
}

impl Block {
    /// Create a new unsigned block extending `prev_hash`.
    pub fn new(prev_hash: Hash, transactions: Vec<Transaction>) -> Self {
        Self {
            header: Header {
                version: BLOCK_VERSION,
                prev_hash,
                root_hash: Hash::ZERO,
            },
            transactions,
            public_key: None,
            signature: None,
        }
    }

    /// Get the block hash (hash of the header).
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Get the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Seal the merkle root into the header, then sign the header hash.
    pub fn sign(&mut self, keypair: &Keypair) -> Signature {
        if !self.transactions.is_empty() {
            self.header.root_hash = compute_merkle_root(&self.transactions);
        }
        let signature = keypair.sign_hash(&self.hash());
        self.public_key = Some(keypair.public_key);
        self.signature = Some(signature);
        signature
    }

    /// Create a signed block.
    pub fn signed(mut self, keypair: &Keypair) -> Self {
        self.sign(keypair);
        self
    }

    /// Check the merkle tree is internally consistent and matches the header.
    pub fn verify_root_hash(&self) -> bool {
        let tree = merkle_tree(&self.transactions);
        tree.verify() && tree.root() == self.header.root_hash
    }

    /// Full integrity check: merkle root (when there are transactions) and signature.
    pub fn verify(&self) -> bool {
        if !self.transactions.is_empty() && !self.verify_root_hash() {
            return false;
        }
        match (&self.public_key, &self.signature) {
            (Some(public_key), Some(signature)) => {
                public_key.verify(self.hash().as_bytes(), signature)
            }
            _ => false,
        }
    }
}
