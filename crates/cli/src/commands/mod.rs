//! CLI commands module.

use anyhow::Result;
use clap::Subcommand;

mod demo;
mod keygen;
mod run;

#[derive(Subcommand)]
pub enum Commands {
    /// Generate or inspect a keypair
    Keygen(keygen::KeygenArgs),
    /// Run a node
    Run(run::RunArgs),
    /// Run three in-process nodes and gossip transactions between them
    Demo(demo::DemoArgs),
}

pub async fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Keygen(args) => keygen::run(args),
        Commands::Run(args) => run::run(args).await,
        Commands::Demo(args) => demo::run(args).await,
    }
}
