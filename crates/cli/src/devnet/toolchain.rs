//! Seam to the external Solana toolchain.
//!
//! The validator, key generator, and build/deploy tools are opaque
//! collaborators invoked as subprocesses; this trait is the only place that
//! knows their command lines, so tests can substitute a mock and the
//! orchestration stages stay tool-agnostic.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::error::DevnetError;

/// Binary names the orchestrator shells out to.
pub const VALIDATOR_BIN: &str = "solana-test-validator";
pub const KEYGEN_BIN: &str = "solana-keygen";
pub const CHAIN_BIN: &str = "solana";
pub const CARGO_BIN: &str = "cargo";

/// External operations the deployment and provisioning stages depend on.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Generates a new keypair file at `out`. The caller is responsible for
    /// atomicity (it passes a temp path and renames on success).
    async fn keygen_new(&self, out: &Path) -> Result<(), DevnetError>;

    /// Requests `sol` of test funds for `address` on the network at `rpc_url`.
    async fn airdrop(&self, address: &str, sol: f64, rpc_url: &str) -> Result<(), DevnetError>;

    /// Builds the program under `source_dir`, placing artifacts in
    /// `artifact_dir`.
    async fn build_program(
        &self,
        source_dir: &Path,
        artifact_dir: &Path,
    ) -> Result<(), DevnetError>;

    /// Deploys `artifact` under the given program keypair, paying from
    /// `payer`. Returns the tool's stdout on success; the error's `Tool`
    /// variant carries the raw diagnostic for retry inspection.
    async fn deploy_program(
        &self,
        artifact: &Path,
        program_keypair: &Path,
        payer: &Path,
        rpc_url: &str,
    ) -> Result<String, DevnetError>;

    /// Creates the account held by `account_keypair` with `sol` of balance,
    /// owned by `owner`, paying from `payer`.
    async fn create_account(
        &self,
        account_keypair: &Path,
        owner: &str,
        sol: f64,
        payer: &Path,
        rpc_url: &str,
    ) -> Result<(), DevnetError>;
}

fn tool_bin_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    // Standard solana-install location, then cargo's bin for cargo-build-sbf.
    if let Some(home) = env::var_os("HOME") {
        let home = PathBuf::from(home);
        dirs.push(home.join(".local/share/solana/install/active_release/bin"));
        dirs.push(home.join(".cargo/bin"));
    }
    dirs
}

/// Locates `program` in the known tool directories, then the inherited PATH.
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    let mut search_dirs = tool_bin_dirs();
    if let Some(path_os) = env::var_os("PATH") {
        search_dirs.extend(env::split_paths(&path_os));
    }
    search_dirs
        .into_iter()
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Resolves every tool in `required`, failing fast before any side effect.
pub fn preflight(required: &[&str]) -> Result<(), DevnetError> {
    for tool in required {
        if find_on_path(tool).is_none() {
            return Err(DevnetError::PrerequisiteMissing {
                tool: (*tool).to_string(),
                searched: "solana install dir, ~/.cargo/bin and PATH".to_string(),
            });
        }
    }
    Ok(())
}

fn augment_cmd_path(cmd: &mut Command) {
    let mut paths = tool_bin_dirs();
    if let Some(path_os) = env::var_os("PATH") {
        paths.extend(env::split_paths(&path_os));
    }
    if let Ok(joined) = env::join_paths(paths) {
        cmd.env("PATH", joined);
    }
}

/// Runs a tool to completion, capturing output. Non-zero exit becomes
/// `DevnetError::Tool` carrying the combined diagnostic.
async fn run_tool(program: &str, args: &[&str]) -> Result<String, DevnetError> {
    let rendered = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    tracing::debug!(target: "devnet", "running `{rendered}`");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    augment_cmd_path(&mut cmd);

    let output = cmd.output().await.map_err(|e| DevnetError::Tool {
        command: rendered.clone(),
        detail: format!("failed to spawn: {e}"),
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(DevnetError::Tool {
            command: rendered,
            detail: format!("{}{}", stdout, stderr).trim().to_string(),
        })
    }
}

/// The real toolchain: `solana-keygen`, `solana`, and `cargo build-sbf`.
pub struct SolanaToolchain;

#[async_trait]
impl Toolchain for SolanaToolchain {
    async fn keygen_new(&self, out: &Path) -> Result<(), DevnetError> {
        run_tool(
            KEYGEN_BIN,
            &[
                "new",
                "--no-bip39-passphrase",
                "--silent",
                "--force",
                "-o",
                &out.to_string_lossy(),
            ],
        )
        .await
        .map(drop)
    }

    async fn airdrop(&self, address: &str, sol: f64, rpc_url: &str) -> Result<(), DevnetError> {
        run_tool(
            CHAIN_BIN,
            &["airdrop", &sol.to_string(), address, "--url", rpc_url],
        )
        .await
        .map(drop)
    }

    async fn build_program(
        &self,
        source_dir: &Path,
        artifact_dir: &Path,
    ) -> Result<(), DevnetError> {
        let manifest = source_dir.join("Cargo.toml");
        run_tool(
            CARGO_BIN,
            &[
                "build-sbf",
                "--manifest-path",
                &manifest.to_string_lossy(),
                "--sbf-out-dir",
                &artifact_dir.to_string_lossy(),
            ],
        )
        .await
        .map_err(|e| DevnetError::Build {
            detail: e.to_string(),
        })
        .map(drop)
    }

    async fn deploy_program(
        &self,
        artifact: &Path,
        program_keypair: &Path,
        payer: &Path,
        rpc_url: &str,
    ) -> Result<String, DevnetError> {
        let out = run_tool(
            CHAIN_BIN,
            &[
                "program",
                "deploy",
                "--program-id",
                &program_keypair.to_string_lossy(),
                "--keypair",
                &payer.to_string_lossy(),
                "--url",
                rpc_url,
                "--commitment",
                "confirmed",
                &artifact.to_string_lossy(),
            ],
        )
        .await?;

        // The deploy tool is only trusted when it prints its success marker.
        if out.contains("Program Id:") {
            Ok(out)
        } else {
            Err(DevnetError::Tool {
                command: format!("{CHAIN_BIN} program deploy"),
                detail: format!("no deploy confirmation in output: {}", out.trim()),
            })
        }
    }

    async fn create_account(
        &self,
        account_keypair: &Path,
        owner: &str,
        sol: f64,
        payer: &Path,
        rpc_url: &str,
    ) -> Result<(), DevnetError> {
        run_tool(
            CHAIN_BIN,
            &[
                "create-account",
                &account_keypair.to_string_lossy(),
                &sol.to_string(),
                "--owner",
                owner,
                "--keypair",
                &payer.to_string_lossy(),
                "--url",
                rpc_url,
            ],
        )
        .await
        .map_err(|e| DevnetError::AccountProvisioning {
            detail: e.to_string(),
        })
        .map(drop)
    }
}
