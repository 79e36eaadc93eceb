use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;

use agent_devnet::devnet::toolchain::{
    preflight, CARGO_BIN, CHAIN_BIN, KEYGEN_BIN, VALIDATOR_BIN,
};
use agent_devnet::{
    BootstrapOptions, ConflictPolicy, DevnetConfig, DevnetError, DevnetSession, RedeployPolicy,
    SolanaToolchain,
};

#[derive(Parser, Debug)]
pub struct StartArgs {
    /// Discard the existing ledger before starting (wallets are kept).
    #[clap(long)]
    pub clean: bool,

    /// Build the test program once the validator is healthy.
    #[clap(long)]
    pub build: bool,

    /// Build and deploy the test program, then record the deployment.
    #[clap(long)]
    pub deploy: bool,

    /// What to do when something already listens on the RPC port.
    #[clap(long, value_enum, default_value = "fail")]
    pub on_conflict: ConflictPolicy,

    /// What to do when the program id is already deployed.
    #[clap(long, value_enum, default_value = "skip")]
    pub on_deployed: RedeployPolicy,

    /// Exit after bootstrap and leave the validator running in the
    /// background; stop it later with `agent-devnet stop`.
    #[clap(long)]
    pub keep_alive: bool,
}

pub async fn run(args: StartArgs, quiet: bool) -> Result<()> {
    let mut required = vec![VALIDATOR_BIN, KEYGEN_BIN, CHAIN_BIN];
    if args.build || args.deploy {
        required.push(CARGO_BIN);
    }
    preflight(&required)?;

    let config = DevnetConfig::from_env();
    let opts = BootstrapOptions {
        clean: args.clean,
        build: args.build,
        deploy: args.deploy,
        conflict_policy: args.on_conflict,
        redeploy_policy: args.on_deployed,
        ..Default::default()
    };

    // Ctrl-C flips the watch flag; the bootstrap observes it at every
    // health-poll boundary and the attach loop below waits on it directly.
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    if !quiet {
        println!("🚀 Starting local devnet (home: {})", config.home.display());
    }

    let mut session =
        match DevnetSession::bootstrap(config, &opts, &SolanaToolchain, &mut shutdown_rx).await {
            Ok(session) => session,
            Err(e @ DevnetError::Interrupted) => {
                // Aborted, not completed: surface a non-zero exit.
                eprintln!("Interrupted; devnet startup aborted.");
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

    if !quiet {
        print_summary(&session);
    }

    if args.keep_alive {
        if !quiet {
            println!("Validator left running; stop it with `agent-devnet stop`.");
        }
        return Ok(());
    }

    // Attached mode: hold the session until Ctrl-C, then tear down what
    // this run owns.
    if !quiet {
        println!("Press Ctrl-C to stop.");
    }
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
    session.shutdown().await?;
    if !quiet {
        println!("Devnet stopped.");
    }
    Ok(())
}

fn print_summary(session: &DevnetSession) {
    println!("\n✅ Devnet ready");
    match session.supervisor.owned_pid() {
        Some(pid) => println!("   • Validator:  pid {pid}"),
        None => println!("   • Validator:  adopted (pre-existing instance)"),
    }
    println!("   • RPC:        {}", session.config.rpc_url());
    println!("   • Websocket:  {}", session.config.ws_url());
    println!("   • Faucet:     {}", session.config.faucet_url());
    for wallet in &session.wallets {
        println!("   • Wallet {:<9} {}", format!("{}:", wallet.name), wallet.address);
    }
    if let Some(record) = &session.deployment {
        println!("   • Program:    {}", record.program_id);
        if let Some(state) = &record.state_account {
            println!("   • State acct: {state}");
        }
    }
    println!(
        "   • Descriptor: {}\n",
        session.config.env_path().display()
    );
}
