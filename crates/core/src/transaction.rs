//! UTXO transactions: hashing with cleared signatures, signing and verification.

use crate::crypto::{Address, Keypair, PublicKey, Signature};
use crate::hash::{hash_encoded, Hash};
use crate::utxo::OutPoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current transaction format version.
pub const TX_VERSION: u32 = 1;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("input {index} has no signature")]
    MissingSignature { index: usize },
}

/// A reference to a previous output, plus the spender's key and signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Hash of the transaction whose output is spent.
    pub prev_tx_hash: Hash,
    /// Index of the spent output within that transaction.
    pub prev_out_index: u32,
    /// Spender's public key.
    pub public_key: PublicKey,
    /// Spender's signature, absent until signed.
    pub signature: Option<Signature>,
}

impl TxInput {
    /// Create an unsigned input spending `prev_tx_hash:prev_out_index`.
    pub fn new(prev_tx_hash: Hash, prev_out_index: u32, public_key: PublicKey) -> Self {
        Self {
            prev_tx_hash,
            prev_out_index,
            public_key,
            signature: None,
        }
    }

    /// The output this input consumes.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.prev_tx_hash, self.prev_out_index)
    }
}

/// An amount credited to an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: u64,
    pub address: Address,
}

impl TxOutput {
    pub fn new(amount: u64, address: Address) -> Self {
        Self { amount, address }
    }
}

/// A transaction on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

/// Input as it is hashed: identical encoding with the signature cleared.
#[derive(Serialize)]
struct UnsignedInput<'a> {
    prev_tx_hash: &'a Hash,
    prev_out_index: u32,
    public_key: &'a PublicKey,
    signature: Option<Signature>,
}

#[derive(Serialize)]
struct UnsignedTransaction<'a> {
    version: u32,
    inputs: Vec<UnsignedInput<'a>>,
    outputs: &'a [TxOutput],
}

impl Transaction {
    /// Create a new unsigned transaction.
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            version: TX_VERSION,
            inputs,
            outputs,
        }
    }

    /// Create a no-input transaction minting `amount` to `address`.
    pub fn mint(amount: u64, address: Address) -> Self {
        Self::new(Vec::new(), vec![TxOutput::new(amount, address)])
    }

    /// Hash of the transaction with every input signature cleared.
    ///
    /// This is both the transaction's identity and the message each input signs.
    pub fn hash(&self) -> Hash {
        let unsigned = UnsignedTransaction {
            version: self.version,
            inputs: self
                .inputs
                .iter()
                .map(|input| UnsignedInput {
                    prev_tx_hash: &input.prev_tx_hash,
                    prev_out_index: input.prev_out_index,
                    public_key: &input.public_key,
                    signature: None,
                })
                .collect(),
            outputs: &self.outputs,
        };
        hash_encoded(&unsigned)
    }

    /// Sign every input whose public key belongs to `keypair`.
    ///
    /// Returns the number of inputs signed.
    pub fn sign(&mut self, keypair: &Keypair) -> usize {
        let hash = self.hash();
        let signature = keypair.sign_hash(&hash);
        let mut signed = 0;
        for input in &mut self.inputs {
            if input.public_key == keypair.public_key {
                input.signature = Some(signature);
                signed += 1;
            }
        }
        signed
    }

    /// Create a signed transaction.
    pub fn signed(mut self, keypair: &Keypair) -> Self {
        self.sign(keypair);
        self
    }

    /// Verify every input signature against the transaction hash.
    ///
    /// A bad signature is `Ok(false)`; an unsigned input is an error.
    pub fn verify(&self) -> Result<bool, TransactionError> {
        let hash = self.hash();
        for (index, input) in self.inputs.iter().enumerate() {
            let signature = input
                .signature
                .as_ref()
                .ok_or(TransactionError::MissingSignature { index })?;
            if !input.public_key.verify(hash.as_bytes(), signature) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether this transaction mints value without spending anything.
    pub fn is_mint(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Sum of all output amounts, widened so it cannot overflow.
    pub fn output_total(&self) -> u128 {
        self.outputs.iter().map(|o| o.amount as u128).sum()
    }

    /// Outpoint of this transaction's `index`-th output.
    pub fn outpoint(&self, index: u32) -> OutPoint {
        OutPoint::new(self.hash(), index)
    }
}
