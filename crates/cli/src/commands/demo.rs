//! Three in-process nodes gossiping genesis-funded transfers.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use gossipchain_chain::{
    genesis_address, genesis_block, genesis_keypair, Blockchain, ChainConfig, GENESIS_AMOUNT,
};
use gossipchain_core::{Keypair, OutPoint, Transaction, TxInput, TxOutput};
use gossipchain_node::{MemoryNetwork, NodeConfig, PeerNode, RequestHandler};
use gossipchain_storage::Stores;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const ADDRESSES: [&str; 3] = [":3000", ":4000", ":5000"];

#[derive(Args)]
pub struct DemoArgs {
    /// Number of transfers to send
    #[arg(short, long, default_value = "5")]
    rounds: u64,

    /// Block time in milliseconds
    #[arg(short, long, default_value = "500")]
    block_time: u64,
}

pub async fn run(args: DemoArgs) -> Result<()> {
    println!("{}", "Starting three-node demo...".bold().cyan());
    println!();

    let validator = Keypair::generate();
    let chain_config = ChainConfig {
        authority: Some(validator.public_key),
    };
    let network = MemoryNetwork::new(Duration::from_secs(2));

    let mut nodes = Vec::new();
    for (i, addr) in ADDRESSES.iter().enumerate() {
        let config = NodeConfig {
            block_time_ms: args.block_time,
            ..NodeConfig::new(*addr)
        };
        let chain = Blockchain::new(Stores::memory(), chain_config.clone())?;
        let key = (i == 0).then(|| validator.clone());
        let node = PeerNode::new(config, Arc::new(chain), Arc::new(network.clone()), key);
        let handler: Arc<dyn RequestHandler> = node.clone();
        network.register(*addr, &handler);
        nodes.push(node);
    }
    println!(
        "  {} {} (validator {})",
        "Nodes:".bold(),
        ADDRESSES.join(", "),
        validator.address().to_hex().bright_yellow()
    );

    nodes[1].bootstrap_network(vec![ADDRESSES[0].into()]).await?;
    nodes[2].bootstrap_network(vec![ADDRESSES[1].into()]).await?;
    for node in &nodes {
        println!(
            "  {} peers {:?}",
            node.config().listen_addr.bold(),
            node.peer_addresses().await?
        );
    }
    println!();

    let (shutdown, shutdown_rx) = watch::channel(false);
    let validator_task = tokio::spawn(nodes[0].clone().run_validator(shutdown_rx));

    let genesis = genesis_keypair();
    let mut funding = OutPoint::new(genesis_block().transactions[0].hash(), 0);
    let mut remaining = GENESIS_AMOUNT;
    let wait = Duration::from_millis(args.block_time * 10);

    for round in 1..=args.rounds {
        let amount = 10 * round;
        if amount > remaining {
            println!("{}", "Genesis funds exhausted.".yellow());
            break;
        }
        let receiver = Keypair::generate();
        let tx = Transaction::new(
            vec![TxInput::new(funding.tx_hash, funding.index, genesis.public_key)],
            vec![
                TxOutput::new(amount, receiver.address()),
                TxOutput::new(remaining - amount, genesis_address()),
            ],
        )
        .signed(&genesis);
        let tx_hash = tx.hash();

        // Submit to the node farthest from the validator.
        nodes[2].handle_transaction(tx.clone()).await?;
        wait_for_inclusion(&nodes, &tx, wait)
            .await
            .with_context(|| format!("Transfer {} was not included", tx_hash))?;

        println!(
            "{} sent {} to {} (tx {})",
            format!("[round {}]", round).bold(),
            amount.to_string().bright_green(),
            receiver.address().to_hex().bright_yellow(),
            tx_hash.to_hex()[..16].dimmed()
        );
        for node in &nodes {
            println!(
                "    {} height {} balance {}",
                node.config().listen_addr,
                node.chain().height(),
                node.chain().balance(&receiver.address())?
            );
        }

        funding = tx.outpoint(1);
        remaining -= amount;
    }

    // Take the last node offline; the others drop it on their next broadcast.
    network.unregister(ADDRESSES[2]);
    println!();
    println!("{} {}", "Disconnected".yellow(), ADDRESSES[2].bold());
    tokio::time::sleep(Duration::from_millis(args.block_time * 3)).await;
    for node in &nodes[..2] {
        println!(
            "  {} peers {:?}",
            node.config().listen_addr.bold(),
            node.peer_addresses().await?
        );
    }

    let _ = shutdown.send(true);
    validator_task.await??;

    println!();
    println!(
        "{} genesis balance {}",
        "Done.".green().bold(),
        nodes[0].chain().balance(&genesis_address())?
    );
    Ok(())
}

async fn wait_for_inclusion(
    nodes: &[Arc<PeerNode>],
    tx: &Transaction,
    timeout: Duration,
) -> Result<()> {
    let hash = tx.hash();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if nodes
            .iter()
            .all(|node| node.chain().get_transaction(&hash).is_ok())
        {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out after {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
