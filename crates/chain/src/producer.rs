//! Block assembly for the validator.

use crate::blockchain::{Blockchain, ChainError, Result};
use gossipchain_core::{Block, Keypair, Transaction};
use tracing::{info, warn};

/// Result of one production round.
#[derive(Debug)]
pub struct Production {
    /// The committed block.
    pub block: Block,
    /// Transactions past the per-block limit, to be re-admitted.
    pub deferred: Vec<Transaction>,
    /// Transactions dropped because they failed validation.
    pub rejected: Vec<(Transaction, ChainError)>,
}

/// Assembles, signs and commits blocks on behalf of the validator key.
pub struct BlockProducer {
    keypair: Keypair,
    max_transactions: usize,
}

impl BlockProducer {
    pub fn new(keypair: Keypair, max_transactions: usize) -> Self {
        Self {
            keypair,
            max_transactions,
        }
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Build a signed block on top of the current head from `candidates`, in the given order.
    ///
    /// Nothing is committed; invalid and excess transactions are reported alongside the block.
    pub fn assemble(&self, chain: &Blockchain, candidates: Vec<Transaction>) -> Production {
        let selection = chain.select_transactions(candidates, self.max_transactions);
        for (tx, err) in &selection.rejected {
            warn!(tx = %tx.hash(), error = %err, "dropping invalid transaction");
        }

        let block = Block::new(chain.head_hash(), selection.accepted).signed(&self.keypair);
        Production {
            block,
            deferred: selection.deferred,
            rejected: selection.rejected,
        }
    }

    /// Commit an assembled block to `chain`.
    pub fn commit(&self, chain: &Blockchain, production: &Production) -> Result<()> {
        chain.add_block(production.block.clone())?;

        info!(
            height = chain.height(),
            txs = production.block.tx_count(),
            deferred = production.deferred.len(),
            rejected = production.rejected.len(),
            "produced block"
        );
        Ok(())
    }

    /// Assemble a block from `candidates` and commit it to `chain`.
    ///
    /// An empty candidate list still yields an empty block.
    pub fn produce(&self, chain: &Blockchain, candidates: Vec<Transaction>) -> Result<Production> {
        let production = self.assemble(chain, candidates);
        self.commit(chain, &production)?;
        Ok(production)
    }
}
