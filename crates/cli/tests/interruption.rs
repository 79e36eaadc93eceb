//! Interrupting a bootstrap mid health-poll must tear down the validator
//! this run spawned and leave no PID record behind.
//!
//! Kept in its own test binary: the fake validator is resolved through a
//! process-wide PATH override.

mod common;

use std::time::Duration;

use tokio::sync::watch;

use agent_devnet::{BootstrapOptions, DevnetConfig, DevnetError, DevnetSession};
use common::MockToolchain;

#[cfg(unix)]
#[tokio::test]
async fn interrupt_mid_poll_tears_down_the_owned_validator() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();

    // A stand-in validator that idles like the real one; found via PATH.
    let bin_dir = dir.path().join("bin");
    std::fs::create_dir_all(&bin_dir).unwrap();
    let fake = bin_dir.join("solana-test-validator");
    std::fs::write(&fake, "#!/bin/sh\nsleep 30\n").unwrap();
    std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
    let old_path = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}:{old_path}", bin_dir.display()));

    let home = dir.path().join("devnet");
    let mut config = DevnetConfig::default().with_home(&home);
    // A free port: nothing answers the probes, so the poll runs until the
    // interrupt arrives.
    config.rpc_port = portpicker::pick_unused_port().unwrap();
    config.health_attempts = 1000;
    let pid_path = config.pid_path();

    let opts = BootstrapOptions {
        health_interval: Duration::from_millis(50),
        ..Default::default()
    };
    let tools = MockToolchain::new();

    let (tx, mut rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(true);
    });

    let err = DevnetSession::bootstrap(config, &opts, &tools, &mut rx)
        .await
        .unwrap_err();
    assert!(matches!(err, DevnetError::Interrupted));
    // The spawned process was stopped and its record removed; a later run
    // starts from a clean slate.
    assert!(!pid_path.exists());
}
