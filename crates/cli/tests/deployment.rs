//! Deploy pipeline: retry bounds, remediation, redeploy policies, build
//! stage fallbacks.

mod common;

use std::path::Path;
use std::time::Duration;

use agent_devnet::devnet::pipeline::REMEDIAL_AIRDROP_SOL;
use agent_devnet::{DeployPipeline, DevnetError, PipelineConfig, RedeployPolicy};
use common::{write_keypair, FakeRpc, MockToolchain, ToolCall};

fn pipeline_config(home: &Path, rpc_url: String) -> PipelineConfig {
    PipelineConfig {
        rpc_url,
        network: "local".to_string(),
        payer: home.join("deployer.json"),
        program_name: "counter".to_string(),
        source_candidates: vec![home.join("no-such-source")],
        artifact_dir: home.join("artifacts"),
        program_keypair: home.join("program-keypair.json"),
        state_account_keypair: home.join("state-account.json"),
        record_path: home.join("deploy.env"),
        redeploy: RedeployPolicy::Skip,
        build: false,
        retry_delay: Duration::from_millis(5),
    }
}

/// Payer keypair plus a prebuilt artifact, so runs start at the deploy stage.
fn stage_home(home: &Path) {
    std::fs::create_dir_all(home.join("artifacts")).unwrap();
    std::fs::write(home.join("artifacts/counter.so"), b"\x7fELF-mock").unwrap();
    write_keypair(&home.join("deployer.json"), 99);
}

// No listener on port 1; the deployment lookup fails and the pipeline
// proceeds as not-yet-deployed.
const DEAD_RPC: &str = "http://127.0.0.1:1";

#[tokio::test]
async fn deploy_gives_up_after_three_attempts() {
    let dir = tempfile::tempdir().unwrap();
    stage_home(dir.path());
    let tools = MockToolchain::new();
    tools.script_deploys(vec![Err("boom"), Err("boom"), Err("boom")]);

    let pipeline = DeployPipeline::new(pipeline_config(dir.path(), DEAD_RPC.to_string()));
    let err = pipeline.run(&tools).await.unwrap_err();
    match err {
        DevnetError::DeployFailure {
            attempts,
            last_diagnostic,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_diagnostic.contains("boom"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(tools.count_deploys(), 3);
    assert!(tools.airdrops().is_empty());
    assert!(!dir.path().join("deploy.env").exists());
}

#[tokio::test]
async fn a_funding_failure_triggers_one_topup_then_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    stage_home(dir.path());
    let tools = MockToolchain::new();
    tools.script_deploys(vec![
        Err("Error: account has insufficient funds for spend (2.1 SOL)"),
        Ok("Program Id: MockProgram1111111111111111111111"),
    ]);

    let pipeline = DeployPipeline::new(pipeline_config(dir.path(), DEAD_RPC.to_string()));
    let record = pipeline.run(&tools).await.unwrap();

    assert_eq!(tools.count_deploys(), 2);
    let airdrops = tools.airdrops();
    assert_eq!(airdrops.len(), 1);
    assert_eq!(airdrops[0].1, REMEDIAL_AIRDROP_SOL);
    assert!(record.state_account.is_some());
    assert!(dir.path().join("deploy.env").exists());
}

#[tokio::test]
async fn state_account_is_owned_by_the_deployed_program() {
    let dir = tempfile::tempdir().unwrap();
    stage_home(dir.path());
    let tools = MockToolchain::new();

    let pipeline = DeployPipeline::new(pipeline_config(dir.path(), DEAD_RPC.to_string()));
    let record = pipeline.run(&tools).await.unwrap();

    let owners: Vec<_> = tools
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            ToolCall::CreateAccount { owner } => Some(owner),
            _ => None,
        })
        .collect();
    assert_eq!(owners, vec![record.program_id.clone()]);
}

#[tokio::test]
async fn skip_policy_leaves_an_existing_deployment_alone() {
    let rpc = FakeRpc::start(true).await;
    rpc.has_account
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let dir = tempfile::tempdir().unwrap();
    stage_home(dir.path());
    let tools = MockToolchain::new();

    let pipeline = DeployPipeline::new(pipeline_config(dir.path(), rpc.url()));
    let record = pipeline.run(&tools).await.unwrap();

    assert_eq!(tools.count_deploys(), 0);
    assert!(record.state_account.is_some());
    assert!(dir.path().join("deploy.env").exists());
}

#[tokio::test]
async fn redeploy_policy_deploys_over_an_existing_program() {
    let rpc = FakeRpc::start(true).await;
    rpc.has_account
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let dir = tempfile::tempdir().unwrap();
    stage_home(dir.path());
    let tools = MockToolchain::new();

    let mut cfg = pipeline_config(dir.path(), rpc.url());
    cfg.redeploy = RedeployPolicy::Redeploy;
    let pipeline = DeployPipeline::new(cfg);
    pipeline.run(&tools).await.unwrap();

    assert_eq!(tools.count_deploys(), 1);
}

#[tokio::test]
async fn build_stage_fails_without_source_or_artifact() {
    let dir = tempfile::tempdir().unwrap();
    write_keypair(&dir.path().join("deployer.json"), 99);
    std::fs::create_dir_all(dir.path().join("artifacts")).unwrap();
    let tools = MockToolchain::new();

    let mut cfg = pipeline_config(dir.path(), DEAD_RPC.to_string());
    cfg.build = true;
    let pipeline = DeployPipeline::new(cfg);
    let err = pipeline.run(&tools).await.unwrap_err();
    assert!(matches!(err, DevnetError::Build { .. }));
}

#[tokio::test]
async fn build_stage_prefers_a_source_tree_when_one_exists() {
    let dir = tempfile::tempdir().unwrap();
    write_keypair(&dir.path().join("deployer.json"), 99);
    std::fs::create_dir_all(dir.path().join("artifacts")).unwrap();
    let source = dir.path().join("program-src");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("Cargo.toml"), "[package]\nname = \"counter\"\n").unwrap();
    let tools = MockToolchain::new();

    let mut cfg = pipeline_config(dir.path(), DEAD_RPC.to_string());
    cfg.build = true;
    cfg.source_candidates = vec![source.clone()];
    let pipeline = DeployPipeline::new(cfg);
    let artifact = pipeline.build_only(&tools).await.unwrap();

    assert!(artifact.ends_with("artifacts/counter.so"));
    assert!(tools
        .calls()
        .contains(&ToolCall::Build { source }));
}
