//! Core ledger primitives for gossipchain.
//!
//! This crate provides the fundamental types used throughout the node:
//! - Key material (Ed25519 seeds, signatures, addresses)
//! - Blake3 hashing and merkle trees
//! - UTXO transactions
//! - Blocks and block headers

pub mod block;
pub mod crypto;
pub mod hash;
pub mod merkle;
pub mod transaction;
pub mod utxo;

// Re-export commonly used types at the crate root
pub use block::{compute_merkle_root, Block, Header};
pub use crypto::{Address, CryptoError, Keypair, PublicKey, Signature};
pub use hash::{hash, hash_concat, Hash, H256};
pub use merkle::{merkle_root, MerkleTree};
pub use transaction::{Transaction, TransactionError, TxInput, TxOutput};
pub use utxo::{OutPoint, Utxo};
