//! Idempotent provisioning of directories and wallet identities.
//!
//! Identities are 64-byte ed25519 keypair files in the JSON-array format the
//! key tool emits. An existing file is always reused, never overwritten;
//! generation goes through a sibling temp path and a rename so a failed run
//! leaves nothing behind.

use std::fs;
use std::path::{Path, PathBuf};

use super::error::DevnetError;
use super::toolchain::Toolchain;

/// A named keypair persisted to disk.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub path: PathBuf,
    /// Base58 public address derived from the persisted key material.
    pub address: String,
    /// Airdrop amount requested for this identity, in SOL.
    pub funding_sol: f64,
}

/// Creates each directory if absent.
pub fn ensure_directories(paths: &[PathBuf]) -> Result<(), DevnetError> {
    for path in paths {
        fs::create_dir_all(path).map_err(|e| DevnetError::fs(path.clone(), e))?;
    }
    Ok(())
}

/// Returns the existing identity at `path`, or generates one.
///
/// Re-running with identical inputs yields the identical address and no
/// second write.
pub async fn ensure_identity(
    name: &str,
    path: &Path,
    funding_sol: f64,
    tools: &dyn Toolchain,
) -> Result<Identity, DevnetError> {
    if path.exists() {
        tracing::debug!(target: "devnet", "reusing identity `{name}` at {}", path.display());
    } else {
        let staging = staging_path(path);
        if let Err(e) = tools.keygen_new(&staging).await {
            let _ = fs::remove_file(&staging);
            return Err(DevnetError::IdentityGeneration {
                name: name.to_string(),
                detail: e.to_string(),
            });
        }
        fs::rename(&staging, path).map_err(|e| {
            let _ = fs::remove_file(&staging);
            DevnetError::IdentityGeneration {
                name: name.to_string(),
                detail: format!("failed to move keypair into place: {e}"),
            }
        })?;
        log::info!("generated identity `{name}` at {}", path.display());
    }

    let address = derive_public_address(path)?;
    Ok(Identity {
        name: name.to_string(),
        path: path.to_path_buf(),
        address,
        funding_sol,
    })
}

/// Reads the persisted keypair and returns its base58 public address.
pub fn derive_public_address(path: &Path) -> Result<String, DevnetError> {
    let raw = fs::read_to_string(path).map_err(|e| DevnetError::CorruptIdentity {
        path: path.to_path_buf(),
        detail: format!("unreadable: {e}"),
    })?;
    let bytes: Vec<u8> = serde_json::from_str(&raw).map_err(|e| DevnetError::CorruptIdentity {
        path: path.to_path_buf(),
        detail: format!("not a JSON byte array: {e}"),
    })?;
    let public = bytes
        .get(32..64)
        .filter(|_| bytes.len() == 64)
        .ok_or_else(|| DevnetError::CorruptIdentity {
            path: path.to_path_buf(),
            detail: format!("expected 64 key bytes, found {}", bytes.len()),
        })?;
    Ok(bs58::encode(public).into_string())
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "keypair".to_string());
    path.with_file_name(format!(".{name}.partial"))
}
