use std::fs;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use agent_devnet::devnet::config::REMOTE_RPC_URL;
use agent_devnet::devnet::provision::{ensure_directories, ensure_identity};
use agent_devnet::devnet::rpc;
use agent_devnet::devnet::toolchain::{preflight, CARGO_BIN, CHAIN_BIN, KEYGEN_BIN};
use agent_devnet::{DeployPipeline, DevnetConfig, PipelineConfig, RedeployPolicy, SolanaToolchain};

/// Deployment target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Network {
    /// The locally supervised validator.
    Local,
    /// The public devnet endpoint.
    Remote,
}

#[derive(Parser, Debug)]
pub struct DeployArgs {
    /// Network to deploy to.
    #[clap(long, value_enum, default_value = "local")]
    pub network: Network,

    /// Payer wallet: a name under the wallets directory, or a keypair path.
    #[clap(long, default_value = "deployer")]
    pub wallet: String,

    /// Build the artifact but skip deployment.
    #[clap(long, conflicts_with = "deploy_only")]
    pub build_only: bool,

    /// Deploy a previously built artifact without rebuilding.
    #[clap(long)]
    pub deploy_only: bool,

    /// Remove previously built artifacts before building.
    #[clap(long)]
    pub clean: bool,

    /// What to do when the program id is already deployed.
    #[clap(long, value_enum, default_value = "skip")]
    pub on_deployed: RedeployPolicy,
}

/// `--wallet` accepts either a logical name under the wallets directory or
/// an explicit keypair path.
fn resolve_wallet(config: &DevnetConfig, wallet: &str) -> (String, std::path::PathBuf) {
    if wallet.contains(std::path::MAIN_SEPARATOR) || wallet.ends_with(".json") {
        let path = std::path::PathBuf::from(wallet);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "payer".to_string());
        (name, path)
    } else {
        (wallet.to_string(), config.wallet_path(wallet))
    }
}

pub async fn run(args: DeployArgs, quiet: bool) -> Result<()> {
    let mut required = vec![KEYGEN_BIN, CHAIN_BIN];
    if !args.deploy_only {
        required.push(CARGO_BIN);
    }
    preflight(&required)?;

    let mut config = DevnetConfig::from_env();
    if args.network == Network::Remote && config.rpc_url_override.is_none() {
        config.rpc_url_override = Some(REMOTE_RPC_URL.to_string());
    }

    if args.clean {
        let artifacts = config.artifact_dir();
        if artifacts.is_dir() {
            fs::remove_dir_all(&artifacts)
                .with_context(|| format!("removing {}", artifacts.display()))?;
        }
    }
    ensure_directories(&config.required_dirs())?;

    // A local deploy needs the supervised validator up; fail fast with a
    // pointer rather than letting the deploy tool time out.
    if args.network == Network::Local
        && !args.build_only
        && !rpc::health_ok(&config.rpc_url()).await
    {
        bail!(
            "no healthy validator at {}; run `agent-devnet start` first",
            config.rpc_url()
        );
    }

    let tools = SolanaToolchain;
    let (payer_name, payer_path) = resolve_wallet(&config, &args.wallet);
    let payer = ensure_identity(&payer_name, &payer_path, 0.0, &tools).await?;

    let network = match args.network {
        Network::Local => "local",
        Network::Remote => "remote",
    };
    let pipeline = DeployPipeline::new(PipelineConfig {
        rpc_url: config.rpc_url(),
        network: network.to_string(),
        payer: payer.path.clone(),
        program_name: "counter".to_string(),
        source_candidates: config.program_source_candidates(),
        artifact_dir: config.artifact_dir(),
        program_keypair: config.program_keypair_path(),
        state_account_keypair: config.state_account_keypair_path(),
        record_path: config.deploy_record_path(),
        redeploy: args.on_deployed,
        build: !args.deploy_only,
        retry_delay: agent_devnet::devnet::pipeline::DEPLOY_RETRY_DELAY,
    });

    if args.build_only {
        let artifact = pipeline.build_only(&tools).await?;
        if !quiet {
            println!("✅ Program built at {}", artifact.display());
        }
        return Ok(());
    }

    let record = pipeline.run(&tools).await?;
    if !quiet {
        println!("✅ Deployed to {network}");
        println!("   • Program:    {}", record.program_id);
        if let Some(state) = &record.state_account {
            println!("   • State acct: {state}");
        }
        println!(
            "   • Record:     {}",
            config.deploy_record_path().display()
        );
    }
    Ok(())
}
