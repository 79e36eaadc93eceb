//! Ownership of the validator subprocess for one orchestration session.
//!
//! State machine: `Idle → Starting → Healthy | Failed → Stopped`. At most
//! one validator is *owned* by a run; a pre-existing listener on the RPC
//! port is an unmanaged process that must be explicitly adopted or replaced
//! (`ConflictPolicy`), never silently taken over.

use std::fs;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use clap::ValueEnum;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::sleep;

use super::config::DevnetConfig;
use super::error::DevnetError;
use super::toolchain::{find_on_path, VALIDATOR_BIN};
use super::{atomic_write, rpc};

/// Interval between liveness probes.
pub const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(1);
/// Grace delay after signalling a conflicting process before spawning.
const REPLACE_GRACE: Duration = Duration::from_secs(1);

/// Health of the supervised validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Unknown,
    Starting,
    Healthy,
    Failed,
}

/// What to do when a listener already occupies the RPC port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConflictPolicy {
    /// Abort the run (default; never destroys someone else's node).
    Fail,
    /// Reuse the existing instance and skip spawning.
    Adopt,
    /// Signal the recorded process, wait a grace period, then spawn fresh.
    Replace,
}

/// The running local node, as seen by this session.
#[derive(Debug, Clone)]
pub enum ValidatorHandle {
    /// Spawned and owned by this run; `stop` is guaranteed on every exit path.
    Owned { pid: u32 },
    /// A pre-existing instance this run explicitly adopted; never signalled.
    Adopted,
}

/// Everything needed to spawn and address the validator.
#[derive(Debug, Clone)]
pub struct ValidatorSpec {
    pub binary: PathBuf,
    pub ledger_dir: PathBuf,
    pub rpc_port: u16,
    pub faucet_port: u16,
    pub rpc_url: String,
    pub log_path: PathBuf,
    pub pid_path: PathBuf,
    /// `(address, artifact)` pairs pre-loaded at genesis.
    pub preload_programs: Vec<(String, PathBuf)>,
}

impl ValidatorSpec {
    pub fn from_config(config: &DevnetConfig) -> Self {
        Self {
            binary: find_on_path(VALIDATOR_BIN).unwrap_or_else(|| PathBuf::from(VALIDATOR_BIN)),
            ledger_dir: config.ledger_dir(),
            rpc_port: config.rpc_port,
            faucet_port: config.faucet_port,
            rpc_url: config.rpc_url(),
            log_path: config.log_path(),
            pid_path: config.pid_path(),
            preload_programs: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Supervisor {
    spec: ValidatorSpec,
    status: HealthStatus,
    handle: Option<ValidatorHandle>,
    child: Option<Child>,
}

impl Supervisor {
    pub fn new(spec: ValidatorSpec) -> Self {
        Self {
            spec,
            status: HealthStatus::Unknown,
            handle: None,
            child: None,
        }
    }

    pub fn spec(&self) -> &ValidatorSpec {
        &self.spec
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn handle(&self) -> Option<&ValidatorHandle> {
        self.handle.as_ref()
    }

    pub fn owned_pid(&self) -> Option<u32> {
        match self.handle {
            Some(ValidatorHandle::Owned { pid }) => Some(pid),
            _ => None,
        }
    }

    /// True when something is already listening on the target RPC port.
    pub fn detect_conflict(port: u16) -> bool {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));
        TcpStream::connect_timeout(&addr, Duration::from_millis(250)).is_ok()
    }

    /// Marks the pre-existing instance as this session's endpoint.
    pub fn adopt(&mut self) {
        log::info!(
            "adopting existing validator on port {}",
            self.spec.rpc_port
        );
        self.handle = Some(ValidatorHandle::Adopted);
        self.status = HealthStatus::Starting;
    }

    /// Best-effort termination of the previously recorded process, then a
    /// fixed grace delay. A missing or stale record is not an error.
    pub async fn replace_conflicting(&self) -> Result<(), DevnetError> {
        match Self::stop_recorded(&self.spec.pid_path)? {
            Some(pid) => log::info!("signalled conflicting validator (pid {pid})"),
            None => log::warn!(
                "port {} is busy but no PID record exists; proceeding anyway",
                self.spec.rpc_port
            ),
        }
        sleep(REPLACE_GRACE).await;
        Ok(())
    }

    /// Spawns the validator, redirects its output to the log sink, and
    /// records the PID so a later, separate invocation can still signal it.
    pub fn start(&mut self) -> Result<u32, DevnetError> {
        if self.handle.is_some() {
            return Err(DevnetError::Tool {
                command: VALIDATOR_BIN.to_string(),
                detail: "a validator is already owned by this session".to_string(),
            });
        }

        let log_file = fs::File::create(&self.spec.log_path)
            .map_err(|e| DevnetError::fs(self.spec.log_path.clone(), e))?;
        let log_clone = log_file
            .try_clone()
            .map_err(|e| DevnetError::fs(self.spec.log_path.clone(), e))?;

        let mut cmd = Command::new(&self.spec.binary);
        cmd.arg("--ledger")
            .arg(&self.spec.ledger_dir)
            .arg("--rpc-port")
            .arg(self.spec.rpc_port.to_string())
            .arg("--faucet-port")
            .arg(self.spec.faucet_port.to_string());
        for (address, artifact) in &self.spec.preload_programs {
            cmd.arg("--bpf-program").arg(address).arg(artifact);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_clone))
            // The node may outlive this process (--keep-alive); teardown is
            // explicit via stop(), driven by the PID record.
            .kill_on_drop(false);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DevnetError::PrerequisiteMissing {
                    tool: VALIDATOR_BIN.to_string(),
                    searched: "solana install dir, ~/.cargo/bin and PATH".to_string(),
                }
            } else {
                DevnetError::Tool {
                    command: self.spec.binary.display().to_string(),
                    detail: format!("failed to spawn: {e}"),
                }
            }
        })?;
        let pid = child.id().ok_or_else(|| DevnetError::Tool {
            command: VALIDATOR_BIN.to_string(),
            detail: "spawned process exited before a PID was observed".to_string(),
        })?;

        atomic_write(&self.spec.pid_path, format!("{pid}\n").as_bytes())
            .map_err(|e| DevnetError::fs(self.spec.pid_path.clone(), e))?;

        log::info!(
            "validator spawned (pid {pid}), logs at {}",
            self.spec.log_path.display()
        );
        self.child = Some(child);
        self.handle = Some(ValidatorHandle::Owned { pid });
        self.status = HealthStatus::Starting;
        Ok(pid)
    }

    /// Polls the liveness endpoint once per `interval` until healthy, the
    /// attempt bound elapses, or `shutdown` fires. The shutdown signal is
    /// observed at every iteration boundary; this is the only blocking wait
    /// in the system.
    pub async fn wait_healthy(
        &mut self,
        attempts: u32,
        interval: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), DevnetError> {
        self.status = HealthStatus::Starting;
        for attempt in 1..=attempts {
            if *shutdown.borrow() {
                self.status = HealthStatus::Failed;
                return Err(DevnetError::Interrupted);
            }
            if rpc::health_ok(&self.spec.rpc_url).await {
                tracing::info!(target: "devnet", "validator healthy after {attempt} probe(s)");
                self.status = HealthStatus::Healthy;
                return Ok(());
            }
            tracing::debug!(target: "devnet", "health probe {attempt}/{attempts} not ready");
            if attempt == attempts {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_ok() {
                        if *shutdown.borrow() {
                            self.status = HealthStatus::Failed;
                            return Err(DevnetError::Interrupted);
                        }
                    } else {
                        // Sender gone; no interrupt can arrive. Keep the
                        // probe cadence instead of spinning.
                        sleep(interval).await;
                    }
                }
                _ = sleep(interval) => {}
            }
        }
        self.status = HealthStatus::Failed;
        Err(DevnetError::HealthCheckTimeout {
            attempts,
            log_path: self.spec.log_path.clone(),
        })
    }

    /// Terminates the owned process and removes the PID record. An adopted
    /// instance is never signalled; an already-exited process is tolerated.
    pub async fn stop(&mut self) -> Result<(), DevnetError> {
        match self.handle.take() {
            Some(ValidatorHandle::Owned { pid }) => {
                if let Some(mut child) = self.child.take() {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                } else {
                    signal_pid(pid as i32)?;
                }
                remove_pid_record(&self.spec.pid_path)?;
                log::info!("validator stopped (pid {pid})");
            }
            Some(ValidatorHandle::Adopted) => {
                log::debug!("adopted validator left running");
            }
            None => {}
        }
        self.status = HealthStatus::Unknown;
        Ok(())
    }

    /// Signals the validator recorded at `pid_path` from a separate
    /// invocation. Returns the PID when a record existed. "No such process"
    /// is tolerated; the stale record is removed either way.
    pub fn stop_recorded(pid_path: &Path) -> Result<Option<u32>, DevnetError> {
        let raw = match fs::read_to_string(pid_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DevnetError::fs(pid_path.to_path_buf(), e)),
        };
        let pid: i32 = raw.trim().parse().map_err(|_| DevnetError::fs(
            pid_path.to_path_buf(),
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("PID record is not a number: {raw:?}"),
            ),
        ))?;
        signal_pid(pid)?;
        remove_pid_record(pid_path)?;
        Ok(Some(pid as u32))
    }
}

/// SIGTERM, tolerating a process that already exited.
fn signal_pid(pid: i32) -> Result<(), DevnetError> {
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(DevnetError::Tool {
                command: format!("kill -TERM {pid}"),
                detail: err.to_string(),
            });
        }
    }
    Ok(())
}

fn remove_pid_record(pid_path: &Path) -> Result<(), DevnetError> {
    match fs::remove_file(pid_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DevnetError::fs(pid_path.to_path_buf(), e)),
    }
}
