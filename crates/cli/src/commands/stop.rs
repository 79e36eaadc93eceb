use anyhow::Result;
use clap::Parser;

use agent_devnet::{DevnetConfig, Supervisor};

#[derive(Parser, Debug)]
pub struct StopArgs {}

/// Signals the validator recorded by a previous `start` and removes the
/// record. A missing record or an already-exited process is not an error.
pub async fn run(_args: StopArgs) -> Result<()> {
    let config = DevnetConfig::from_env();
    match Supervisor::stop_recorded(&config.pid_path())? {
        Some(pid) => println!("✅ Stopped validator (pid {pid})."),
        None => println!("No recorded validator to stop."),
    }
    Ok(())
}
