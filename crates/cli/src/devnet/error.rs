//! Error taxonomy for the devnet orchestrator.
//!
//! Lower-level failures (subprocess exits, malformed tool output) are wrapped
//! into these variants with enough context (command, path) to reproduce the
//! failure manually. Nothing is silently swallowed except the tolerated
//! "process already stopped" case handled inside `supervisor::stop`.

use std::path::PathBuf;
use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors raised by the orchestration stages.
#[derive(Error, Debug)]
pub enum DevnetError {
    /// A required external tool is absent from the environment.
    #[error("required tool `{tool}` not found on PATH (searched {searched})")]
    PrerequisiteMissing {
        /// Name of the missing binary.
        tool: String,
        /// Human-readable summary of the locations searched.
        searched: String,
    },

    /// Directory or file creation failed.
    #[error("filesystem operation failed for {path}: {source}")]
    Filesystem {
        /// The path the operation targeted.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Keypair generation failed; no partial file is left behind.
    #[error("failed to generate identity `{name}`: {detail}")]
    IdentityGeneration {
        /// Logical wallet name.
        name: String,
        /// Diagnostic from the key tool.
        detail: String,
    },

    /// A persisted identity file is unreadable or malformed.
    #[error("identity file {path} is corrupt: {detail}")]
    CorruptIdentity {
        /// Path of the offending file.
        path: PathBuf,
        /// What was wrong with it.
        detail: String,
    },

    /// A listener already occupies the target RPC port and policy is `fail`.
    #[error("port {port} is already in use; rerun with --on-conflict adopt or --on-conflict replace")]
    PortConflict {
        /// The contested RPC port.
        port: u16,
    },

    /// The validator never answered the liveness probe within the bound.
    #[error("validator not healthy after {attempts} probes; see log at {log_path}")]
    HealthCheckTimeout {
        /// Number of probes issued.
        attempts: u32,
        /// Where the validator's output was redirected.
        log_path: PathBuf,
    },

    /// Program build failed, or no source and no prebuilt artifact exist.
    #[error("program build failed: {detail}")]
    Build {
        /// Diagnostic from the build tool, or why nothing could be built.
        detail: String,
    },

    /// All deploy attempts were exhausted.
    #[error("deploy failed after {attempts} attempts: {last_diagnostic}")]
    DeployFailure {
        /// How many attempts were made.
        attempts: u32,
        /// Raw diagnostic from the final attempt.
        last_diagnostic: String,
    },

    /// The program's state account could not be created.
    #[error("state account provisioning failed: {detail}")]
    AccountProvisioning {
        /// Diagnostic from the chain tool.
        detail: String,
    },

    /// The environment descriptor could not be written.
    ///
    /// Reported but non-fatal: completed stages have their own durable records.
    #[error("failed to write environment descriptor {path}: {source}")]
    AggregationWrite {
        /// Descriptor path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// An external tool exited non-zero or produced unusable output.
    #[error("`{command}` failed: {detail}")]
    Tool {
        /// The command line that was invoked.
        command: String,
        /// Captured stderr/stdout diagnostic.
        detail: String,
    },

    /// An interrupt or termination signal arrived mid-stage.
    #[error("interrupted by shutdown signal")]
    Interrupted,
}

impl ErrorCode for DevnetError {
    fn code(&self) -> &'static str {
        match self {
            Self::PrerequisiteMissing { .. } => "DEVNET_PREREQ_MISSING",
            Self::Filesystem { .. } => "DEVNET_FILESYSTEM",
            Self::IdentityGeneration { .. } => "DEVNET_IDENTITY_GENERATION",
            Self::CorruptIdentity { .. } => "DEVNET_IDENTITY_CORRUPT",
            Self::PortConflict { .. } => "DEVNET_PORT_CONFLICT",
            Self::HealthCheckTimeout { .. } => "DEVNET_HEALTH_TIMEOUT",
            Self::Build { .. } => "DEVNET_BUILD_FAILED",
            Self::DeployFailure { .. } => "DEVNET_DEPLOY_FAILED",
            Self::AccountProvisioning { .. } => "DEVNET_ACCOUNT_PROVISIONING",
            Self::AggregationWrite { .. } => "DEVNET_AGGREGATION_WRITE",
            Self::Tool { .. } => "DEVNET_TOOL_FAILED",
            Self::Interrupted => "DEVNET_INTERRUPTED",
        }
    }
}

impl DevnetError {
    /// Wraps an IO error with the path it concerned.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_distinct() {
        let errs = [
            DevnetError::PortConflict { port: 8899 },
            DevnetError::Interrupted,
            DevnetError::Build {
                detail: "x".into(),
            },
        ];
        let codes: Vec<_> = errs.iter().map(|e| e.code()).collect();
        assert_eq!(
            codes,
            vec![
                "DEVNET_PORT_CONFLICT",
                "DEVNET_INTERRUPTED",
                "DEVNET_BUILD_FAILED"
            ]
        );
    }

    #[test]
    fn health_timeout_names_the_log() {
        let e = DevnetError::HealthCheckTimeout {
            attempts: 30,
            log_path: PathBuf::from("/tmp/validator.log"),
        };
        let msg = e.to_string();
        assert!(msg.contains("30 probes"));
        assert!(msg.contains("/tmp/validator.log"));
    }
}
