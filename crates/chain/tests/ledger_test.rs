use gossipchain_chain::{
    genesis_address, genesis_block, genesis_keypair, BlockProducer, Blockchain, ChainConfig,
    ChainError, Mempool,
};
use gossipchain_core::{Block, Keypair, OutPoint, Transaction, TxInput, TxOutput};
use gossipchain_storage::{SledStore, Stores};
use std::sync::Barrier;

fn genesis_outpoint() -> OutPoint {
    genesis_block().transactions[0].outpoint(0)
}

fn transfer(from: &Keypair, spent: OutPoint, outputs: Vec<TxOutput>) -> Transaction {
    Transaction::new(
        vec![TxInput::new(spent.tx_hash, spent.index, from.public_key)],
        outputs,
    )
    .signed(from)
}

fn block_on(chain: &Blockchain, producer: &Keypair, txs: Vec<Transaction>) -> Block {
    Block::new(chain.head_hash(), txs).signed(producer)
}

#[test]
fn test_double_spend_across_blocks() {
    let chain = Blockchain::in_memory().unwrap();
    let validator = Keypair::generate();
    let genesis = genesis_keypair();
    let alice = Keypair::generate();
    let bob = Keypair::generate();

    // Block 1: genesis pays alice 600 and keeps 400 in change.
    let pay_alice = transfer(
        &genesis,
        genesis_outpoint(),
        vec![
            TxOutput::new(600, alice.address()),
            TxOutput::new(400, genesis_address()),
        ],
    );
    chain
        .add_block(block_on(&chain, &validator, vec![pay_alice.clone()]))
        .unwrap();

    // Block 2: alice pays bob out of that output.
    let pay_bob = transfer(
        &alice,
        pay_alice.outpoint(0),
        vec![TxOutput::new(600, bob.address())],
    );
    chain
        .add_block(block_on(&chain, &validator, vec![pay_bob]))
        .unwrap();
    assert_eq!(chain.height(), 2);

    // Block 3: alice tries to spend the same output again.
    let replay = transfer(
        &alice,
        pay_alice.outpoint(0),
        vec![TxOutput::new(600, alice.address())],
    );
    let head = chain.head_hash();
    let result = chain.add_block(block_on(&chain, &validator, vec![replay]));
    assert!(matches!(result, Err(ChainError::AlreadySpent(op)) if op == pay_alice.outpoint(0)));

    assert_eq!(chain.height(), 2);
    assert_eq!(chain.head_hash(), head);
    let spent = chain.get_utxo(&pay_alice.outpoint(0)).unwrap();
    assert!(spent.spent);
    assert_eq!(spent.amount, 600);

    assert_eq!(chain.balance(&alice.address()).unwrap(), 0);
    assert_eq!(chain.balance(&bob.address()).unwrap(), 600);
    assert_eq!(chain.balance(&genesis_address()).unwrap(), 400);
}

#[test]
fn test_rejected_block_leaves_state_unchanged() {
    let chain = Blockchain::in_memory().unwrap();
    let validator = Keypair::generate();
    let genesis = genesis_keypair();
    let receiver = Keypair::generate();

    // The first transaction is valid on its own; the second overspends.
    let valid = transfer(
        &genesis,
        genesis_outpoint(),
        vec![TxOutput::new(1000, receiver.address())],
    );
    let overspend = transfer(
        &receiver,
        valid.outpoint(0),
        vec![TxOutput::new(1001, receiver.address())],
    );
    let block = block_on(&chain, &validator, vec![valid.clone(), overspend]);
    let block_hash = block.hash();

    assert!(matches!(
        chain.add_block(block),
        Err(ChainError::InsufficientBalance { .. })
    ));
    assert_eq!(chain.height(), 0);
    assert!(!chain.has_block(&block_hash).unwrap());
    assert!(matches!(
        chain.get_transaction(&valid.hash()),
        Err(ChainError::NotFound(_))
    ));
    assert!(matches!(
        chain.get_utxo(&valid.outpoint(0)),
        Err(ChainError::NotFound(_))
    ));
    assert!(!chain.get_utxo(&genesis_outpoint()).unwrap().spent);
    assert_eq!(chain.balance(&genesis_address()).unwrap(), 1000);
}

#[test]
fn test_exact_amount_accepted() {
    let chain = Blockchain::in_memory().unwrap();
    let genesis = genesis_keypair();
    let tx = transfer(
        &genesis,
        genesis_outpoint(),
        vec![
            TxOutput::new(1, Keypair::generate().address()),
            TxOutput::new(999, Keypair::generate().address()),
        ],
    );
    chain
        .add_block(block_on(&chain, &Keypair::generate(), vec![tx]))
        .unwrap();
    assert_eq!(chain.height(), 1);
}

#[test]
fn test_mempool_to_block() {
    let chain = Blockchain::in_memory().unwrap();
    let mempool = Mempool::new();
    let producer = BlockProducer::new(Keypair::generate(), 100);
    let genesis = genesis_keypair();
    let alice = Keypair::generate();

    let first = transfer(
        &genesis,
        genesis_outpoint(),
        vec![TxOutput::new(1000, alice.address())],
    );
    let second = transfer(
        &alice,
        first.outpoint(0),
        vec![TxOutput::new(1000, genesis_address())],
    );
    assert!(mempool.add(first.clone()));
    assert!(mempool.add(second.clone()));
    assert!(!mempool.add(first.clone()));

    let production = producer.produce(&chain, mempool.clear()).unwrap();
    assert!(mempool.is_empty());
    assert_eq!(production.block.transactions, vec![first, second]);
    assert_eq!(chain.get_block_by_height(1).unwrap(), production.block);
    assert_eq!(chain.balance(&genesis_address()).unwrap(), 1000);
    assert_eq!(chain.balance(&alice.address()).unwrap(), 0);
}

#[test]
fn test_sled_chain_replays_same_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let store = SledStore::open(dir.path().join("ledger")).unwrap();
    let chain = Blockchain::new(Stores::sled(store), ChainConfig::default()).unwrap();
    let producer = BlockProducer::new(Keypair::generate(), 100);
    let genesis = genesis_keypair();

    let tx = transfer(
        &genesis,
        genesis_outpoint(),
        vec![TxOutput::new(250, genesis_address())],
    );
    producer.produce(&chain, vec![tx.clone()]).unwrap();
    producer.produce(&chain, vec![]).unwrap();

    assert_eq!(chain.height(), 2);
    assert_eq!(chain.get_transaction(&tx.hash()).unwrap(), tx);
    assert_eq!(chain.balance(&genesis_address()).unwrap(), 250);
    assert_eq!(chain.get_block_by_height(0).unwrap(), genesis_block());
}

#[test]
fn test_concurrent_children_of_same_head() {
    let chain = Blockchain::in_memory().unwrap();
    let genesis = genesis_keypair();
    let receivers: Vec<Keypair> = (0..8).map(|_| Keypair::generate()).collect();
    let blocks: Vec<Block> = receivers
        .iter()
        .map(|receiver| {
            let tx = transfer(
                &genesis,
                genesis_outpoint(),
                vec![TxOutput::new(1000, receiver.address())],
            );
            block_on(&chain, &Keypair::generate(), vec![tx])
        })
        .collect();

    let barrier = Barrier::new(blocks.len());
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = blocks
            .iter()
            .map(|block| {
                let chain = &chain;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    chain.add_block(block.clone())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let committed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(committed, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, ChainError::InvalidPrevHash { .. })));
    assert_eq!(chain.height(), 1);

    let funded: Vec<u128> = receivers
        .iter()
        .map(|r| chain.balance(&r.address()).unwrap())
        .filter(|balance| *balance > 0)
        .collect();
    assert_eq!(funded, vec![1000]);
    assert_eq!(chain.balance(&genesis_address()).unwrap(), 0);
    assert!(chain.get_utxo(&genesis_outpoint()).unwrap().spent);
}
