//! The environment descriptor: one `KEY=VALUE` line per fact a client
//! needs to reach the devnet. Written atomically so consumers never see a
//! half-written file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::atomic_write;
use super::error::DevnetError;
use super::pipeline::DeployRecord;
use super::provision::Identity;

/// Parses a `KEY=VALUE` file. Blank lines and `#` comments are ignored;
/// a repeated key keeps the later value.
pub fn parse_kv(path: &Path) -> Result<BTreeMap<String, String>, DevnetError> {
    let contents = fs::read_to_string(path).map_err(|e| DevnetError::fs(path, e))?;
    let mut map = BTreeMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok(map)
}

/// Accumulates descriptor entries in insertion order.
#[derive(Debug, Default, Clone)]
pub struct EnvDescriptor {
    entries: Vec<(String, String)>,
}

impl EnvDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Network endpoints: RPC, websocket, faucet.
    pub fn extend_network(&mut self, rpc_url: &str, ws_url: &str, faucet_url: &str) {
        self.push("RPC_URL", rpc_url);
        self.push("WS_URL", ws_url);
        self.push("FAUCET_URL", faucet_url);
    }

    /// Facts about the supervised process itself. The PID is present only
    /// for a validator owned by this run, never for an adopted one.
    pub fn extend_validator(&mut self, ledger_dir: &Path, log_path: &Path, pid: Option<u32>) {
        self.push("LEDGER_DIR", ledger_dir.display().to_string());
        self.push("LOG_FILE", log_path.display().to_string());
        if let Some(pid) = pid {
            self.push("VALIDATOR_PID", pid.to_string());
        }
    }

    /// Keypair path and derived address for one provisioned wallet.
    pub fn extend_wallet(&mut self, identity: &Identity) {
        let prefix = identity.name.to_ascii_uppercase();
        self.push(
            format!("{prefix}_WALLET"),
            identity.path.display().to_string(),
        );
        self.push(format!("{prefix}_ADDRESS"), identity.address.clone());
    }

    /// Deployment facts, present only when the deploy stage ran.
    pub fn extend_deployment(&mut self, record: &DeployRecord) {
        self.push("PROGRAM_ID", record.program_id.clone());
        if let Some(account) = &record.state_account {
            self.push("STATE_ACCOUNT", account.clone());
        }
        self.push("PROGRAM_ARTIFACT", record.artifact.display().to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<(), DevnetError> {
        atomic_write(path, self.render().as_bytes()).map_err(|source| {
            DevnetError::AggregationWrite {
                path: path.to_path_buf(),
                source,
            }
        })
    }
}
