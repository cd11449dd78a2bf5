//! Run a node over TCP.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use gossipchain_chain::{Blockchain, ChainConfig};
use gossipchain_core::{Keypair, PublicKey};
use gossipchain_node::{serve, NodeConfig, PeerNode, TcpTransport};
use gossipchain_storage::{SledStore, Stores};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::warn;

#[derive(Args)]
pub struct RunArgs {
    /// Address to listen on (overrides the config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Peers to bootstrap from
    #[arg(short, long)]
    bootstrap: Vec<String>,

    /// Hex seed of the validator key; makes this node produce blocks
    #[arg(long)]
    validator_seed: Option<String>,

    /// Hex public key of the only accepted block producer
    #[arg(long)]
    authority: Option<String>,

    /// JSON node config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for a fresh sled database; in-memory when omitted
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("Failed to load config: {:?}", path))?,
        None => NodeConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    let validator = args
        .validator_seed
        .as_deref()
        .map(Keypair::from_seed_hex)
        .transpose()
        .context("Invalid validator seed")?;
    let authority = match &args.authority {
        Some(key) => Some(PublicKey::from_hex(key).context("Invalid authority key")?),
        None => validator.as_ref().map(|key| key.public_key),
    };

    let stores = match &args.data_dir {
        Some(dir) => {
            let store = SledStore::open(dir)
                .with_context(|| format!("Failed to open storage: {:?}", dir))?;
            Stores::sled(store)
        }
        None => Stores::memory(),
    };
    let chain = Blockchain::new(stores, ChainConfig { authority })
        .context("Failed to initialize chain")?;

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    println!("{}", "Starting gossipchain node...".bold().cyan());
    println!("  {} {}", "Listening:".bold(), config.listen_addr.bright_white());
    if let Some(key) = &validator {
        println!(
            "  {} {}",
            "Validator:".bold(),
            key.public_key.to_hex().bright_yellow()
        );
    }

    let transport = Arc::new(TcpTransport::new(config.request_timeout()));
    let node = PeerNode::new(config, Arc::new(chain), transport, validator);
    let server = tokio::spawn(serve(listener, node.clone()));

    if !args.bootstrap.is_empty() {
        let node = node.clone();
        let addrs = args.bootstrap;
        tokio::spawn(async move {
            if let Err(err) = node.bootstrap_network(addrs).await {
                warn!(error = %err, "bootstrap failed");
            }
        });
    }

    let (shutdown, shutdown_rx) = watch::channel(false);
    let validator_task = node
        .is_validator()
        .then(|| tokio::spawn(node.clone().run_validator(shutdown_rx)));

    tokio::select! {
        result = server => {
            result.context("Server task panicked")?.context("Server stopped")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            println!("{}", "Shutting down...".yellow());
        }
    }

    let _ = shutdown.send(true);
    if let Some(task) = validator_task {
        task.await.context("Validator task panicked")??;
    }
    Ok(())
}
