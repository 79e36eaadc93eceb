#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # Agent Devnet CLI
//!
//! Developer front end for the devnet orchestrator: start and supervise a
//! local validator, deploy the test program, and inspect or stop a running
//! session.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::*;

#[derive(Parser, Debug)]
#[clap(
    name = "agent-devnet",
    version,
    about = "Local Solana devnet orchestrator for agent development.",
    long_about = "agent-devnet bootstraps a single-node test validator, provisions \
and funds the agent and deployer wallets, optionally builds and deploys the \
test program, and writes a KEY=VALUE environment descriptor for clients."
)]
struct Cli {
    /// Suppress the connection summary and informational output.
    #[clap(long, global = true)]
    quiet: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the local validator and bootstrap the full environment.
    Start(start::StartArgs),

    /// Build and/or deploy the test program against a running network.
    Deploy(deploy::DeployArgs),

    /// Stop the validator recorded by a previous start.
    Stop(stop::StopArgs),

    /// Report the health and contents of the current environment.
    Status(status::StatusArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", if cli.quiet { "warn" } else { "info" });
    }
    env_logger::init();

    match cli.command {
        Commands::Start(args) => start::run(args, cli.quiet).await,
        Commands::Deploy(args) => deploy::run(args, cli.quiet).await,
        Commands::Stop(args) => stop::run(args).await,
        Commands::Status(args) => status::run(args).await,
    }
}
