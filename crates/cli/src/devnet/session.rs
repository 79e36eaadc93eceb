//! One bootstrap run: clean → provision → spawn → health gate → fund →
//! deploy → descriptor.
//!
//! Fatal failures tear down anything the run owns before propagating.
//! Post-health conveniences (wallet funding, descriptor write) degrade to
//! warnings so a transient faucet hiccup does not kill a healthy devnet.

use std::fs;
use std::time::Duration;

use tokio::sync::watch;

use super::config::DevnetConfig;
use super::descriptor::EnvDescriptor;
use super::error::DevnetError;
use super::pipeline::{
    DeployPipeline, DeployRecord, PipelineConfig, RedeployPolicy, DEPLOY_RETRY_DELAY,
};
use super::provision::{ensure_directories, ensure_identity, Identity};
use super::supervisor::{ConflictPolicy, Supervisor, ValidatorSpec, HEALTH_PROBE_INTERVAL};
use super::toolchain::Toolchain;

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Discard the ledger before starting (wallets are kept).
    pub clean: bool,
    /// Build the test program.
    pub build: bool,
    /// Build (if needed) and deploy the test program.
    pub deploy: bool,
    pub conflict_policy: ConflictPolicy,
    pub redeploy_policy: RedeployPolicy,
    pub health_interval: Duration,
    pub retry_delay: Duration,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            clean: false,
            build: false,
            deploy: false,
            conflict_policy: ConflictPolicy::Fail,
            redeploy_policy: RedeployPolicy::Skip,
            health_interval: HEALTH_PROBE_INTERVAL,
            retry_delay: DEPLOY_RETRY_DELAY,
        }
    }
}

/// A bootstrapped devnet: the supervised validator plus everything
/// provisioned around it.
#[derive(Debug)]
pub struct DevnetSession {
    pub config: DevnetConfig,
    pub supervisor: Supervisor,
    pub wallets: Vec<Identity>,
    pub deployment: Option<DeployRecord>,
}

impl DevnetSession {
    /// Runs the full bootstrap sequence. Every stage must succeed before the
    /// next runs; `shutdown` is observed during the health wait.
    pub async fn bootstrap(
        config: DevnetConfig,
        opts: &BootstrapOptions,
        tools: &dyn Toolchain,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Self, DevnetError> {
        if opts.clean {
            clean_ledger(&config)?;
        }
        ensure_directories(&config.required_dirs())?;

        let mut wallets = Vec::new();
        for spec in DevnetConfig::wallet_set() {
            let identity = ensure_identity(
                spec.name,
                &config.wallet_path(spec.name),
                spec.funding_sol,
                tools,
            )
            .await?;
            log::info!("wallet `{}` at {}", identity.name, identity.address);
            wallets.push(identity);
        }

        let mut supervisor = Supervisor::new(ValidatorSpec::from_config(&config));
        if Supervisor::detect_conflict(config.rpc_port) {
            match opts.conflict_policy {
                ConflictPolicy::Fail => {
                    return Err(DevnetError::PortConflict {
                        port: config.rpc_port,
                    })
                }
                ConflictPolicy::Adopt => supervisor.adopt(),
                ConflictPolicy::Replace => {
                    supervisor.replace_conflicting().await?;
                    supervisor.start()?;
                }
            }
        } else {
            supervisor.start()?;
        }

        if let Err(e) = supervisor
            .wait_healthy(config.health_attempts, opts.health_interval, shutdown)
            .await
        {
            // Never leave an owned process running behind a failed run.
            let _ = supervisor.stop().await;
            return Err(e);
        }

        for wallet in &wallets {
            if wallet.funding_sol <= 0.0 {
                continue;
            }
            if let Err(e) = tools
                .airdrop(&wallet.address, wallet.funding_sol, &config.rpc_url())
                .await
            {
                log::warn!(
                    "funding `{}` with {} SOL failed: {e}",
                    wallet.name,
                    wallet.funding_sol
                );
            }
        }

        let deployment = if opts.deploy {
            let pipeline = DeployPipeline::new(pipeline_config(&config, opts, "local"));
            match pipeline.run(tools).await {
                Ok(record) => Some(record),
                Err(e) => {
                    let _ = supervisor.stop().await;
                    return Err(e);
                }
            }
        } else if opts.build {
            let pipeline = DeployPipeline::new(pipeline_config(&config, opts, "local"));
            let artifact = pipeline.build_only(tools).await?;
            log::info!("program built at {}", artifact.display());
            None
        } else {
            None
        };

        let session = Self {
            config,
            supervisor,
            wallets,
            deployment,
        };
        session.write_descriptor();
        Ok(session)
    }

    /// Writes the environment descriptor for the current session state.
    /// Failure is reported but does not tear down a healthy devnet.
    pub fn write_descriptor(&self) {
        let mut desc = EnvDescriptor::new();
        desc.extend_network(
            &self.config.rpc_url(),
            &self.config.ws_url(),
            &self.config.faucet_url(),
        );
        desc.extend_validator(
            &self.config.ledger_dir(),
            &self.config.log_path(),
            self.supervisor.owned_pid(),
        );
        for wallet in &self.wallets {
            desc.extend_wallet(wallet);
        }
        if let Some(record) = &self.deployment {
            desc.extend_deployment(record);
        }
        let path = self.config.env_path();
        match desc.write(&path) {
            Ok(()) => log::info!("environment descriptor written to {}", path.display()),
            Err(e) => log::warn!("{e}"),
        }
    }

    /// Stops the owned validator, if any. Adopted instances are untouched.
    pub async fn shutdown(&mut self) -> Result<(), DevnetError> {
        self.supervisor.stop().await
    }
}

/// Assembles the deploy pipeline's inputs from the session configuration.
/// The deployer wallet pays; `network` is recorded alongside the result.
pub fn pipeline_config(
    config: &DevnetConfig,
    opts: &BootstrapOptions,
    network: &str,
) -> PipelineConfig {
    PipelineConfig {
        rpc_url: config.rpc_url(),
        network: network.to_string(),
        payer: config.wallet_path("deployer"),
        program_name: "counter".to_string(),
        source_candidates: config.program_source_candidates(),
        artifact_dir: config.artifact_dir(),
        program_keypair: config.program_keypair_path(),
        state_account_keypair: config.state_account_keypair_path(),
        record_path: config.deploy_record_path(),
        redeploy: opts.redeploy_policy,
        build: opts.build || opts.deploy,
        retry_delay: opts.retry_delay,
    }
}

/// Discards ledger state. Wallets and prior artifacts survive a clean start.
pub fn clean_ledger(config: &DevnetConfig) -> Result<(), DevnetError> {
    let ledger = config.ledger_dir();
    match fs::remove_dir_all(&ledger) {
        Ok(()) => {
            log::info!("removed ledger at {}", ledger.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DevnetError::fs(ledger, e)),
    }
}
