//! Devnet orchestration library.
//!
//! Stages run strictly sequentially within one invocation: provisioning,
//! then validator supervision, then (optionally) the deployment pipeline,
//! then environment aggregation. The modules here are driven by the CLI in
//! `commands/` and directly by the integration tests.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod pipeline;
pub mod provision;
pub mod rpc;
pub mod session;
pub mod supervisor;
pub mod toolchain;

use std::io::Write;
use std::path::Path;

/// Writes `contents` to `path` via a sibling temp file and rename, so a
/// concurrently-running consumer never observes a partial file.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
