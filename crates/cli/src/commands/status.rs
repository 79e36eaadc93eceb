use std::fs;

use anyhow::Result;
use clap::Parser;

use agent_devnet::devnet::descriptor::parse_kv;
use agent_devnet::devnet::pipeline::{inspect_deploy_state, DeployState};
use agent_devnet::devnet::rpc;
use agent_devnet::DevnetConfig;

#[derive(Parser, Debug)]
pub struct StatusArgs {}

/// Reports the recorded PID, the RPC health probe result, and the current
/// environment descriptor. Purely read-only.
pub async fn run(_args: StatusArgs) -> Result<()> {
    let config = DevnetConfig::from_env();

    match fs::read_to_string(config.pid_path()) {
        Ok(raw) => {
            let pid = raw.trim();
            let alive = pid
                .parse::<i32>()
                .map(|pid| unsafe { libc::kill(pid, 0) } == 0)
                .unwrap_or(false);
            if alive {
                println!("Validator:  running (pid {pid})");
            } else {
                println!("Validator:  recorded pid {pid} is not running (stale record)");
            }
        }
        Err(_) => println!("Validator:  no PID record"),
    }

    let rpc_url = config.rpc_url();
    if rpc::health_ok(&rpc_url).await {
        println!("RPC:        {rpc_url} (healthy)");
    } else {
        println!("RPC:        {rpc_url} (unreachable)");
    }

    let artifact = config.artifact_dir().join("counter.so");
    match inspect_deploy_state(&artifact, &config.deploy_record_path()) {
        DeployState::Deployed => println!(
            "Program:    deployed (record at {})",
            config.deploy_record_path().display()
        ),
        DeployState::Built => println!("Program:    built, not deployed"),
        DeployState::NotBuilt => println!("Program:    not built"),
    }

    match parse_kv(&config.env_path()) {
        Ok(map) if !map.is_empty() => {
            println!("Descriptor: {}", config.env_path().display());
            for (key, value) in &map {
                println!("   {key}={value}");
            }
        }
        _ => println!("Descriptor: none (run `agent-devnet start`)"),
    }
    Ok(())
}
