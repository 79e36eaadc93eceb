//! Resolved orchestration configuration.
//!
//! Defaults are overridden once at startup from `AGENT_DEVNET_*` environment
//! variables, then from CLI flags. Nothing re-reads the environment mid-run.

use std::path::{Path, PathBuf};

/// Default RPC port of `solana-test-validator`.
pub const DEFAULT_RPC_PORT: u16 = 8899;
/// Default faucet port.
pub const DEFAULT_FAUCET_PORT: u16 = 9900;
/// Default bound on health probes (one per second).
pub const DEFAULT_HEALTH_ATTEMPTS: u32 = 30;
/// Public devnet endpoint used for `--network remote` deploys.
pub const REMOTE_RPC_URL: &str = "https://api.devnet.solana.com";

/// A wallet the provisioner guarantees to exist, with its requested funding.
#[derive(Debug, Clone)]
pub struct WalletSpec {
    /// Logical name; also the descriptor key prefix.
    pub name: &'static str,
    /// Airdrop amount requested once the validator is healthy, in SOL.
    pub funding_sol: f64,
}

#[derive(Debug, Clone)]
pub struct DevnetConfig {
    /// Root of all session artifacts (ledger, wallets, descriptor).
    pub home: PathBuf,
    pub rpc_port: u16,
    pub faucet_port: u16,
    /// Explicit RPC URL override (remote deploys, adopted nodes behind proxies).
    pub rpc_url_override: Option<String>,
    pub health_attempts: u32,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from(".devnet"),
            rpc_port: DEFAULT_RPC_PORT,
            faucet_port: DEFAULT_FAUCET_PORT,
            rpc_url_override: None,
            health_attempts: DEFAULT_HEALTH_ATTEMPTS,
        }
    }
}

/// Maps an RPC URL to its websocket counterpart: http→ws, https→wss, and
/// an explicit port bumped by one (the validator's convention).
fn ws_from_rpc(url: &str) -> String {
    let (scheme, rest) = if let Some(rest) = url.strip_prefix("https://") {
        ("wss://", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        ("ws://", rest)
    } else {
        ("ws://", url)
    };
    match rest.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            let bumped = port.parse::<u32>().map(|p| p.saturating_add(1)).unwrap_or(0);
            format!("{scheme}{host}:{bumped}")
        }
        _ => format!("{scheme}{rest}"),
    }
}

fn env_port(key: &str, default: u16) -> u16 {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("ignoring unparseable {key}={raw}");
            default
        }),
        Err(_) => default,
    }
}

impl DevnetConfig {
    /// Builds the configuration from defaults plus environment overrides.
    ///
    /// Recognised variables: `AGENT_DEVNET_HOME`, `AGENT_DEVNET_RPC_PORT`,
    /// `AGENT_DEVNET_FAUCET_PORT`, `AGENT_DEVNET_URL`,
    /// `AGENT_DEVNET_HEALTH_ATTEMPTS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            home: std::env::var_os("AGENT_DEVNET_HOME")
                .map(PathBuf::from)
                .unwrap_or(defaults.home),
            rpc_port: env_port("AGENT_DEVNET_RPC_PORT", defaults.rpc_port),
            faucet_port: env_port("AGENT_DEVNET_FAUCET_PORT", defaults.faucet_port),
            rpc_url_override: std::env::var("AGENT_DEVNET_URL").ok(),
            health_attempts: match std::env::var("AGENT_DEVNET_HEALTH_ATTEMPTS") {
                Ok(raw) => raw.parse().unwrap_or_else(|_| {
                    log::warn!("ignoring unparseable AGENT_DEVNET_HEALTH_ATTEMPTS={raw}");
                    defaults.health_attempts
                }),
                Err(_) => defaults.health_attempts,
            },
        }
    }

    /// The fixed set of wallets every session provisions.
    pub fn wallet_set() -> &'static [WalletSpec] {
        &[
            WalletSpec {
                name: "agent",
                funding_sol: 10.0,
            },
            WalletSpec {
                name: "deployer",
                funding_sol: 100.0,
            },
        ]
    }

    pub fn rpc_url(&self) -> String {
        match &self.rpc_url_override {
            Some(url) => url.clone(),
            None => format!("http://127.0.0.1:{}", self.rpc_port),
        }
    }

    /// Websocket endpoint; `solana-test-validator` serves it on RPC port + 1.
    /// With an RPC URL override in effect, the websocket endpoint is derived
    /// from that URL instead of the local ports.
    pub fn ws_url(&self) -> String {
        match &self.rpc_url_override {
            Some(url) => ws_from_rpc(url),
            None => format!("ws://127.0.0.1:{}", self.rpc_port.saturating_add(1)),
        }
    }

    pub fn faucet_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.faucet_port)
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.home.join("ledger")
    }

    pub fn wallets_dir(&self) -> PathBuf {
        self.home.join("wallets")
    }

    /// Output directory for built program artifacts.
    pub fn artifact_dir(&self) -> PathBuf {
        self.home.join("artifacts")
    }

    pub fn wallet_path(&self, name: &str) -> PathBuf {
        self.wallets_dir().join(format!("{name}.json"))
    }

    /// PID record lives under the ledger directory so a later invocation can
    /// still signal the process.
    pub fn pid_path(&self) -> PathBuf {
        self.ledger_dir().join("validator.pid")
    }

    pub fn log_path(&self) -> PathBuf {
        self.home.join("validator.log")
    }

    pub fn env_path(&self) -> PathBuf {
        self.home.join("devnet.env")
    }

    pub fn deploy_record_path(&self) -> PathBuf {
        self.home.join("deploy.env")
    }

    /// The deployment keypair; reused across redeploys so the program id is
    /// stable.
    pub fn program_keypair_path(&self) -> PathBuf {
        self.wallets_dir().join("program-keypair.json")
    }

    pub fn state_account_keypair_path(&self) -> PathBuf {
        self.wallets_dir().join("state-account.json")
    }

    /// Candidate locations searched for the test program's source tree.
    pub fn program_source_candidates(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from("programs/counter"),
            PathBuf::from("program"),
            self.home.join("program-src"),
        ]
    }

    /// Directories the provisioner guarantees before any other stage runs.
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.home.clone(),
            self.ledger_dir(),
            self.wallets_dir(),
            self.artifact_dir(),
        ]
    }

    /// Rebases every session path under `root` (test sandboxes).
    pub fn with_home(mut self, root: &Path) -> Self {
        self.home = root.to_path_buf();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_local() {
        let cfg = DevnetConfig::default();
        assert_eq!(cfg.rpc_url(), "http://127.0.0.1:8899");
        assert_eq!(cfg.ws_url(), "ws://127.0.0.1:8900");
        assert_eq!(cfg.faucet_url(), "http://127.0.0.1:9900");
        assert_eq!(cfg.pid_path(), PathBuf::from(".devnet/ledger/validator.pid"));
    }

    #[test]
    fn override_url_wins() {
        let cfg = DevnetConfig {
            rpc_url_override: Some("http://10.0.0.5:8899".into()),
            ..Default::default()
        };
        assert_eq!(cfg.rpc_url(), "http://10.0.0.5:8899");
        assert_eq!(cfg.ws_url(), "ws://10.0.0.5:8900");
    }

    #[test]
    fn ws_url_follows_an_override_without_a_port() {
        let cfg = DevnetConfig {
            rpc_url_override: Some("https://api.devnet.solana.com".into()),
            ..Default::default()
        };
        assert_eq!(cfg.ws_url(), "wss://api.devnet.solana.com");
    }

    #[test]
    fn ws_url_saturates_at_the_port_ceiling() {
        let cfg = DevnetConfig {
            rpc_port: u16::MAX,
            ..Default::default()
        };
        assert_eq!(cfg.ws_url(), "ws://127.0.0.1:65535");
    }

    #[test]
    fn wallet_set_is_fixed() {
        let names: Vec<_> = DevnetConfig::wallet_set().iter().map(|w| w.name).collect();
        assert_eq!(names, vec!["agent", "deployer"]);
    }
}
