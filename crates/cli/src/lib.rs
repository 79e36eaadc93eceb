#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # Agent Devnet
//!
//! Library for bootstrapping a local, single-node Solana devnet for agent
//! development: it supervises `solana-test-validator`, provisions and funds
//! wallets idempotently, builds and deploys the project's test program with
//! bounded retries, and publishes everything a client needs as a `KEY=VALUE`
//! environment descriptor.
//!
//! The orchestration stages live under [`devnet`] and are driven end to end
//! by [`DevnetSession::bootstrap`]. External tools are reached only through
//! the [`Toolchain`] trait, so tests substitute a mock and exercise the real
//! sequencing, retry, and teardown logic without any Solana installation.

pub mod devnet;

pub use devnet::config::DevnetConfig;
pub use devnet::descriptor::EnvDescriptor;
pub use devnet::error::{DevnetError, ErrorCode};
pub use devnet::pipeline::{DeployPipeline, DeployRecord, PipelineConfig, RedeployPolicy};
pub use devnet::session::{BootstrapOptions, DevnetSession};
pub use devnet::supervisor::{ConflictPolicy, HealthStatus, Supervisor, ValidatorSpec};
pub use devnet::toolchain::{SolanaToolchain, Toolchain};
