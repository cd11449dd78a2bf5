//! The chain: header history, validation rules, and the only writer of the stores.

use crate::genesis::genesis_block;
use gossipchain_core::{
    Address, Block, Hash, Header, OutPoint, PublicKey, Transaction, TransactionError, Utxo,
};
use gossipchain_storage::{StorageError, Stores, UtxoStore};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during chain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("input {index} has no signature")]
    MissingSignature { index: usize },

    #[error("block signed by unauthorized key {0}")]
    UnauthorizedSigner(String),

    #[error("block does not extend the head (expected prev_hash {expected}, got {got})")]
    InvalidPrevHash { expected: Hash, got: Hash },

    #[error("output {0} already spent")]
    AlreadySpent(OutPoint),

    #[error("output {0} is not owned by the spending key")]
    NotOwner(OutPoint),

    #[error("insufficient balance (inputs {inputs}, outputs {outputs})")]
    InsufficientBalance { inputs: u128, outputs: u128 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("height {requested} too high (current height {height})")]
    HeightTooHigh { requested: u64, height: u64 },

    #[error("store already holds a chain")]
    AlreadyInitialized,

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ChainError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => ChainError::NotFound(what),
            other => ChainError::Storage(other),
        }
    }
}

impl From<TransactionError> for ChainError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::MissingSignature { index } => ChainError::MissingSignature { index },
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Chain configuration.
#[derive(Debug, Clone, Default)]
pub struct ChainConfig {
    /// When set, only blocks signed by this key are accepted.
    pub authority: Option<PublicKey>,
}

/// Append-only header history; index = height.
#[derive(Debug, Default)]
struct HeaderList {
    headers: Vec<Header>,
}

impl HeaderList {
    fn add(&mut self, header: Header) {
        self.headers.push(header);
    }

    fn height(&self) -> u64 {
        self.headers.len().saturating_sub(1) as u64
    }

    fn get(&self, height: u64) -> Option<&Header> {
        self.headers.get(height as usize)
    }

    fn top_hash(&self) -> Hash {
        self.headers.last().map(Header::hash).unwrap_or(Hash::ZERO)
    }
}

/// UTXO changes layered over the store while transactions are validated.
struct StagedUtxos<'a> {
    store: &'a dyn UtxoStore,
    changes: HashMap<OutPoint, Utxo>,
}

impl<'a> StagedUtxos<'a> {
    fn new(store: &'a dyn UtxoStore) -> Self {
        Self {
            store,
            changes: HashMap::new(),
        }
    }

    fn get(&self, outpoint: &OutPoint) -> Result<Utxo> {
        match self.changes.get(outpoint) {
            Some(utxo) => Ok(utxo.clone()),
            None => Ok(self.store.get(outpoint)?),
        }
    }

    /// Mark `consumed` spent and create one unspent entry per output of `tx`.
    fn apply(&mut self, tx: &Transaction, consumed: Vec<Utxo>) {
        for utxo in consumed {
            self.changes.insert(utxo.outpoint, utxo.into_spent());
        }
        let tx_hash = tx.hash();
        for (index, output) in tx.outputs.iter().enumerate() {
            let outpoint = OutPoint::new(tx_hash, index as u32);
            self.changes
                .insert(outpoint, Utxo::new(outpoint, output.amount, output.address));
        }
    }

    fn into_changes(self) -> Vec<Utxo> {
        self.changes.into_values().collect()
    }
}

/// Outcome of dry-running candidate transactions against the current head.
#[derive(Debug, Default)]
pub struct Selection {
    /// Transactions that validate in order, ready for a block.
    pub accepted: Vec<Transaction>,
    /// Transactions that failed validation, with the reason.
    pub rejected: Vec<(Transaction, ChainError)>,
    /// Transactions left over once the limit was reached.
    pub deferred: Vec<Transaction>,
}

/// Chain state: header history over a block store, a transaction store and the UTXO set.
///
/// All mutation goes through [`Blockchain::add_block`], which holds the header lock for the
/// whole check-then-commit sequence, so concurrent callers are applied one at a time.
pub struct Blockchain {
    stores: Stores,
    headers: Mutex<HeaderList>,
    config: ChainConfig,
}

impl Blockchain {
    /// Create a chain over `stores`, seeded with the genesis block at height 0.
    ///
    /// The stores must be empty: headers are not persisted, so an existing chain cannot be resumed.
    pub fn new(stores: Stores, config: ChainConfig) -> Result<Self> {
        let genesis = genesis_block();
        if stores.blocks.contains(&genesis.hash())? {
            return Err(ChainError::AlreadyInitialized);
        }
        let mut staged = StagedUtxos::new(stores.utxos.as_ref());
        for tx in &genesis.transactions {
            staged.apply(tx, Vec::new());
        }
        let changes = staged.into_changes();
        stores.commit(&genesis, &changes)?;

        let mut headers = HeaderList::default();
        headers.add(genesis.header.clone());
        info!(hash = %genesis.hash(), "seeded genesis block");

        Ok(Self {
            stores,
            headers: Mutex::new(headers),
            config,
        })
    }

    /// Create a chain over fresh in-memory stores.
    pub fn in_memory() -> Result<Self> {
        Self::new(Stores::memory(), ChainConfig::default())
    }

    /// Get the current chain height (0 = genesis only).
    pub fn height(&self) -> u64 {
        self.headers.lock().height()
    }

    /// Hash of the current top block.
    pub fn head_hash(&self) -> Hash {
        self.headers.lock().top_hash()
    }

    /// Get a block by hash.
    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Block> {
        Ok(self.stores.blocks.get(hash)?)
    }

    /// Get a block by height; fails with `HeightTooHigh` past the head.
    pub fn get_block_by_height(&self, height: u64) -> Result<Block> {
        let hash = {
            let headers = self.headers.lock();
            let header = headers.get(height).ok_or(ChainError::HeightTooHigh {
                requested: height,
                height: headers.height(),
            })?;
            header.hash()
        };
        self.get_block_by_hash(&hash)
    }

    /// Whether a block with this hash has been committed.
    pub fn has_block(&self, hash: &Hash) -> Result<bool> {
        Ok(self.stores.blocks.contains(hash)?)
    }

    /// Get a committed transaction by hash.
    pub fn get_transaction(&self, hash: &Hash) -> Result<Transaction> {
        Ok(self.stores.transactions.get(hash)?)
    }

    /// Look up a UTXO entry, spent or not.
    pub fn get_utxo(&self, outpoint: &OutPoint) -> Result<Utxo> {
        Ok(self.stores.utxos.get(outpoint)?)
    }

    /// Sum of the unspent outputs recorded for `address`.
    pub fn balance(&self, address: &Address) -> Result<u128> {
        let utxos = self.stores.utxos.unspent_for(address)?;
        Ok(utxos.iter().map(|u| u.amount as u128).sum())
    }

    /// Validate a transaction against the committed UTXO set without changing anything.
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<()> {
        let _headers = self.headers.lock();
        let mut staged = StagedUtxos::new(self.stores.utxos.as_ref());
        stage_transaction(tx, &mut staged)
    }

    /// Dry-run `candidates` in order, each seeing the effects of those accepted before it.
    ///
    /// At most `limit` are accepted; the rest are returned untouched in `deferred`.
    pub fn select_transactions(&self, candidates: Vec<Transaction>, limit: usize) -> Selection {
        let _headers = self.headers.lock();
        let mut staged = StagedUtxos::new(self.stores.utxos.as_ref());
        let mut selection = Selection::default();

        for tx in candidates {
            if selection.accepted.len() >= limit {
                selection.deferred.push(tx);
                continue;
            }
            match stage_transaction(&tx, &mut staged) {
                Ok(()) => selection.accepted.push(tx),
                Err(err) => selection.rejected.push((tx, err)),
            }
        }
        selection
    }

    /// Validate `block` and, only if every check passes, commit it on top of the head.
    ///
    /// Checks run in order: block signature and merkle root, signer authority, previous hash,
    /// then every transaction. Nothing is written unless all of them pass, and the write itself
    /// is a single [`Stores::commit`].
    pub fn add_block(&self, block: Block) -> Result<()> {
        if !block.verify() {
            return Err(ChainError::InvalidSignature);
        }
        if let Some(authority) = &self.config.authority {
            if block.public_key.as_ref() != Some(authority) {
                let signer = block.public_key.map(|k| k.to_hex()).unwrap_or_default();
                return Err(ChainError::UnauthorizedSigner(signer));
            }
        }

        let mut headers = self.headers.lock();

        let expected = headers.top_hash();
        if block.header.prev_hash != expected {
            return Err(ChainError::InvalidPrevHash {
                expected,
                got: block.header.prev_hash,
            });
        }

        let mut staged = StagedUtxos::new(self.stores.utxos.as_ref());
        for tx in &block.transactions {
            stage_transaction(tx, &mut staged)?;
        }
        let changes = staged.into_changes();

        self.stores.commit(&block, &changes)?;
        headers.add(block.header.clone());

        info!(
            height = headers.height(),
            hash = %block.hash(),
            txs = block.tx_count(),
            "block committed"
        );
        Ok(())
    }
}

/// Check `tx` against `staged` and, on success, record its effects there.
fn stage_transaction(tx: &Transaction, staged: &mut StagedUtxos<'_>) -> Result<()> {
    if !tx.verify()? {
        return Err(ChainError::InvalidSignature);
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    let mut consumed = Vec::with_capacity(tx.inputs.len());
    let mut input_total: u128 = 0;

    for input in &tx.inputs {
        let outpoint = input.outpoint();
        let utxo = staged.get(&outpoint)?;
        if utxo.spent || !seen.insert(outpoint) {
            return Err(ChainError::AlreadySpent(outpoint));
        }
        if utxo.address != input.public_key.address() {
            return Err(ChainError::NotOwner(outpoint));
        }
        input_total += utxo.amount as u128;
        consumed.push(utxo);
    }

    let output_total = tx.output_total();
    if input_total < output_total {
        return Err(ChainError::InsufficientBalance {
            inputs: input_total,
            outputs: output_total,
        });
    }

    debug!(tx = %tx.hash(), inputs = input_total, outputs = output_total, "transaction valid");
    staged.apply(tx, consumed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::{genesis_address, genesis_keypair, GENESIS_AMOUNT};
    use gossipchain_core::{Keypair, TxInput, TxOutput};
    use gossipchain_storage::{BlockWriter, Result as StorageResult};

    fn next_block(chain: &Blockchain, transactions: Vec<Transaction>) -> Block {
        Block::new(chain.head_hash(), transactions).signed(&Keypair::generate())
    }

    fn genesis_outpoint() -> OutPoint {
        genesis_block().transactions[0].outpoint(0)
    }

    fn spend_genesis(outputs: Vec<TxOutput>) -> Transaction {
        let key = genesis_keypair();
        Transaction::new(
            vec![TxInput::new(genesis_outpoint().tx_hash, 0, key.public_key)],
            outputs,
        )
        .signed(&key)
    }

    #[test]
    fn test_new_chain() {
        let chain = Blockchain::in_memory().unwrap();
        assert_eq!(chain.height(), 0);

        let genesis = chain.get_block_by_height(0).unwrap();
        assert_eq!(genesis, genesis_block());
        assert_eq!(chain.head_hash(), genesis.hash());

        let utxo = chain.get_utxo(&genesis_outpoint()).unwrap();
        assert_eq!(utxo.amount, GENESIS_AMOUNT);
        assert_eq!(utxo.address, genesis_address());
        assert!(!utxo.spent);
        assert_eq!(chain.balance(&genesis_address()).unwrap(), 1000);
    }

    #[test]
    fn test_add_empty_blocks() {
        let chain = Blockchain::in_memory().unwrap();
        for i in 1..100u64 {
            let block = next_block(&chain, vec![]);
            let hash = block.hash();
            chain.add_block(block.clone()).unwrap();

            assert_eq!(chain.height(), i);
            assert_eq!(chain.get_block_by_hash(&hash).unwrap(), block);
            assert_eq!(chain.get_block_by_height(i).unwrap(), block);
        }
    }

    #[test]
    fn test_height_too_high() {
        let chain = Blockchain::in_memory().unwrap();
        assert!(matches!(
            chain.get_block_by_height(1),
            Err(ChainError::HeightTooHigh { requested: 1, height: 0 })
        ));
    }

    #[test]
    fn test_missing_block_is_not_found() {
        let chain = Blockchain::in_memory().unwrap();
        assert!(matches!(
            chain.get_block_by_hash(&Hash::ZERO),
            Err(ChainError::NotFound(_))
        ));
    }

    #[test]
    fn test_wrong_prev_hash_rejected() {
        let chain = Blockchain::in_memory().unwrap();
        let block = Block::new(Hash::ZERO, vec![]).signed(&Keypair::generate());
        assert!(matches!(
            chain.add_block(block),
            Err(ChainError::InvalidPrevHash { .. })
        ));
        assert_eq!(chain.height(), 0);
    }

    #[test]
    fn test_unsigned_block_rejected() {
        let chain = Blockchain::in_memory().unwrap();
        let block = Block::new(chain.head_hash(), vec![]);
        assert!(matches!(
            chain.add_block(block),
            Err(ChainError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_root_rejected() {
        let chain = Blockchain::in_memory().unwrap();
        let tx = spend_genesis(vec![TxOutput::new(1000, Address::ZERO)]);
        let mut block = next_block(&chain, vec![tx]);
        block.transactions[0].outputs[0].amount = 999;
        assert!(matches!(
            chain.add_block(block),
            Err(ChainError::InvalidSignature)
        ));
    }

    #[test]
    fn test_add_block_with_transaction() {
        let chain = Blockchain::in_memory().unwrap();
        let receiver = Keypair::generate().address();
        let tx = spend_genesis(vec![
            TxOutput::new(100, receiver),
            TxOutput::new(900, genesis_address()),
        ]);
        let tx_hash = tx.hash();

        chain.add_block(next_block(&chain, vec![tx.clone()])).unwrap();

        assert_eq!(chain.get_transaction(&tx_hash).unwrap(), tx);
        assert!(chain.get_utxo(&genesis_outpoint()).unwrap().spent);
        assert_eq!(chain.get_utxo(&tx.outpoint(0)).unwrap().amount, 100);
        assert_eq!(chain.get_utxo(&tx.outpoint(1)).unwrap().amount, 900);
        assert_eq!(chain.balance(&receiver).unwrap(), 100);
        assert_eq!(chain.balance(&genesis_address()).unwrap(), 900);
    }

    #[test]
    fn test_insufficient_balance() {
        let chain = Blockchain::in_memory().unwrap();
        let tx = spend_genesis(vec![TxOutput::new(1001, Address::ZERO)]);
        assert!(matches!(
            chain.add_block(next_block(&chain, vec![tx])),
            Err(ChainError::InsufficientBalance { inputs: 1000, outputs: 1001 })
        ));
        assert_eq!(chain.height(), 0);
        assert!(!chain.get_utxo(&genesis_outpoint()).unwrap().spent);
    }

    #[test]
    fn test_surplus_input_accepted() {
        let chain = Blockchain::in_memory().unwrap();
        let tx = spend_genesis(vec![TxOutput::new(10, Address::ZERO)]);
        chain.add_block(next_block(&chain, vec![tx])).unwrap();
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn test_unsigned_input_rejected() {
        let chain = Blockchain::in_memory().unwrap();
        let key = genesis_keypair();
        let tx = Transaction::new(
            vec![TxInput::new(genesis_outpoint().tx_hash, 0, key.public_key)],
            vec![TxOutput::new(1, Address::ZERO)],
        );
        assert!(matches!(
            chain.validate_transaction(&tx),
            Err(ChainError::MissingSignature { index: 0 })
        ));
    }

    #[test]
    fn test_unknown_input_not_found() {
        let chain = Blockchain::in_memory().unwrap();
        let key = Keypair::generate();
        let tx = Transaction::new(
            vec![TxInput::new(Hash::ZERO, 0, key.public_key)],
            vec![],
        )
        .signed(&key);
        assert!(matches!(
            chain.validate_transaction(&tx),
            Err(ChainError::NotFound(_))
        ));
    }

    #[test]
    fn test_double_spend_inside_one_block() {
        let chain = Blockchain::in_memory().unwrap();
        let first = spend_genesis(vec![TxOutput::new(1000, Address::ZERO)]);
        let second = spend_genesis(vec![TxOutput::new(500, Address::ZERO)]);

        assert!(matches!(
            chain.add_block(next_block(&chain, vec![first, second])),
            Err(ChainError::AlreadySpent(_))
        ));
        assert_eq!(chain.height(), 0);
        assert!(!chain.get_utxo(&genesis_outpoint()).unwrap().spent);
    }

    #[test]
    fn test_same_input_twice_in_one_transaction() {
        let chain = Blockchain::in_memory().unwrap();
        let key = genesis_keypair();
        let input = TxInput::new(genesis_outpoint().tx_hash, 0, key.public_key);
        let tx = Transaction::new(
            vec![input.clone(), input],
            vec![TxOutput::new(2000, Address::ZERO)],
        )
        .signed(&key);
        assert!(matches!(
            chain.validate_transaction(&tx),
            Err(ChainError::AlreadySpent(_))
        ));
    }

    #[test]
    fn test_chained_spend_inside_one_block() {
        let chain = Blockchain::in_memory().unwrap();
        let alice = Keypair::generate();
        let first = spend_genesis(vec![TxOutput::new(1000, alice.address())]);
        let second = Transaction::new(
            vec![TxInput::new(first.hash(), 0, alice.public_key)],
            vec![TxOutput::new(1000, Address::ZERO)],
        )
        .signed(&alice);

        chain
            .add_block(next_block(&chain, vec![first.clone(), second]))
            .unwrap();
        assert!(chain.get_utxo(&first.outpoint(0)).unwrap().spent);
        assert_eq!(chain.balance(&alice.address()).unwrap(), 0);
    }

    #[test]
    fn test_authority_enforced() {
        let authority = Keypair::generate();
        let config = ChainConfig {
            authority: Some(authority.public_key),
        };
        let chain = Blockchain::new(Stores::memory(), config).unwrap();

        let foreign = Block::new(chain.head_hash(), vec![]).signed(&Keypair::generate());
        assert!(matches!(
            chain.add_block(foreign),
            Err(ChainError::UnauthorizedSigner(_))
        ));

        let own = Block::new(chain.head_hash(), vec![]).signed(&authority);
        chain.add_block(own).unwrap();
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn test_select_transactions() {
        let chain = Blockchain::in_memory().unwrap();
        let alice = Keypair::generate();
        let good = spend_genesis(vec![TxOutput::new(1000, alice.address())]);
        let conflicting = spend_genesis(vec![TxOutput::new(1, alice.address())]);
        let follow_up = Transaction::new(
            vec![TxInput::new(good.hash(), 0, alice.public_key)],
            vec![TxOutput::new(1000, Address::ZERO)],
        )
        .signed(&alice);

        let selection = chain.select_transactions(
            vec![good.clone(), conflicting.clone(), follow_up.clone()],
            1,
        );
        assert_eq!(selection.accepted, vec![good.clone()]);
        assert_eq!(selection.rejected.len(), 1);
        assert_eq!(selection.rejected[0].0, conflicting);
        assert_eq!(selection.deferred, vec![follow_up.clone()]);

        let selection = chain.select_transactions(vec![good.clone(), follow_up.clone()], 10);
        assert_eq!(selection.accepted, vec![good, follow_up]);
        assert_eq!(chain.height(), 0);
    }

    #[test]
    fn test_sled_backed_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = gossipchain_storage::SledStore::open(dir.path()).unwrap();
        let chain = Blockchain::new(Stores::sled(store), ChainConfig::default()).unwrap();

        let tx = spend_genesis(vec![TxOutput::new(1000, Address::ZERO)]);
        chain.add_block(next_block(&chain, vec![tx])).unwrap();
        assert_eq!(chain.height(), 1);
        assert!(chain.get_utxo(&genesis_outpoint()).unwrap().spent);
    }

    #[test]
    fn test_reused_store_rejected() {
        let stores = Stores::memory();
        Blockchain::new(stores.clone(), ChainConfig::default()).unwrap();
        assert!(matches!(
            Blockchain::new(stores, ChainConfig::default()),
            Err(ChainError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_spend_by_non_owner_rejected() {
        let chain = Blockchain::in_memory().unwrap();
        let thief = Keypair::generate();
        let tx = Transaction::new(
            vec![TxInput::new(genesis_outpoint().tx_hash, 0, thief.public_key)],
            vec![TxOutput::new(1000, thief.address())],
        )
        .signed(&thief);

        assert!(tx.verify().unwrap());
        assert!(matches!(
            chain.validate_transaction(&tx),
            Err(ChainError::NotOwner(op)) if op == genesis_outpoint()
        ));
        assert!(matches!(
            chain.add_block(next_block(&chain, vec![tx])),
            Err(ChainError::NotOwner(_))
        ));
        assert_eq!(chain.balance(&genesis_address()).unwrap(), 1000);
    }

    /// Lets the genesis commit through, then fails every write.
    struct FailingWriter {
        inner: std::sync::Arc<dyn BlockWriter>,
        allowed: std::sync::atomic::AtomicUsize,
    }

    impl BlockWriter for FailingWriter {
        fn write_block(&self, block: &Block, utxos: &[Utxo]) -> StorageResult<()> {
            use std::sync::atomic::Ordering;
            let allowed = self.allowed.load(Ordering::SeqCst);
            if allowed == 0 {
                let err = bincode::ErrorKind::Custom("disk full".into());
                return Err(StorageError::Serialization(Box::new(err)));
            }
            self.allowed.store(allowed - 1, Ordering::SeqCst);
            self.inner.write_block(block, utxos)
        }
    }

    #[test]
    fn test_failed_write_leaves_state_unchanged() {
        let mut stores = Stores::memory();
        stores.writer = std::sync::Arc::new(FailingWriter {
            inner: stores.writer.clone(),
            allowed: std::sync::atomic::AtomicUsize::new(1),
        });
        let chain = Blockchain::new(stores, ChainConfig::default()).unwrap();

        let tx = spend_genesis(vec![TxOutput::new(1000, Address::ZERO)]);
        let block = next_block(&chain, vec![tx.clone()]);
        assert!(matches!(
            chain.add_block(block.clone()),
            Err(ChainError::Storage(_))
        ));

        assert_eq!(chain.height(), 0);
        assert!(!chain.has_block(&block.hash()).unwrap());
        assert!(chain.get_transaction(&tx.hash()).is_err());
        assert!(!chain.get_utxo(&genesis_outpoint()).unwrap().spent);
        assert_eq!(chain.balance(&genesis_address()).unwrap(), 1000);
    }
}
