//! Keypair generation command.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use gossipchain_core::Keypair;

#[derive(Args)]
pub struct KeygenArgs {
    /// Derive from this hex seed instead of generating a fresh one
    #[arg(short, long)]
    seed: Option<String>,

    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: KeygenArgs) -> Result<()> {
    let keypair = match &args.seed {
        Some(seed) => Keypair::from_seed_hex(seed).context("Invalid seed")?,
        None => Keypair::generate(),
    };

    if args.json {
        let output = serde_json::json!({
            "seed": keypair.seed_hex(),
            "public_key": keypair.public_key.to_hex(),
            "address": keypair.address().to_hex(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", "Keypair".bold().cyan());
    println!();
    println!("  {}    {}", "Seed:".bold(), keypair.seed_hex().bright_red());
    println!(
        "  {}  {}",
        "Public:".bold(),
        keypair.public_key.to_hex().bright_white()
    );
    println!(
        "  {} {}",
        "Address:".bold(),
        keypair.address().to_hex().bright_yellow()
    );
    println!();
    println!("{}", "Keep the seed secret.".yellow());
    Ok(())
}
