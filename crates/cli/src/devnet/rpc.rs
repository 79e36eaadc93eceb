//! JSON-RPC probes against the validator.
//!
//! Deliberately minimal: the orchestrator only needs a liveness check and an
//! existence lookup. Everything stateful goes through the external chain
//! tool instead.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use super::error::DevnetError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// One liveness probe. Any HTTP success response counts as healthy; any
/// connection failure or error status counts as not-yet-healthy.
pub async fn health_ok(rpc_url: &str) -> bool {
    let body = json!({"jsonrpc": "2.0", "id": 1, "method": "getHealth"});
    // A fresh client per probe: no pooled connection can mask a dead node.
    let client = reqwest::Client::new();
    match client
        .post(rpc_url)
        .timeout(PROBE_TIMEOUT)
        .json(&body)
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[derive(Debug, Deserialize)]
struct AccountInfoResponse {
    result: Option<AccountInfoResult>,
}

#[derive(Debug, Deserialize)]
struct AccountInfoResult {
    value: Option<serde_json::Value>,
}

/// Looks up whether an account exists for `address` (used to detect an
/// already-deployed program before choosing the redeploy policy).
pub async fn account_exists(rpc_url: &str, address: &str) -> Result<bool, DevnetError> {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "getAccountInfo",
        "params": [address, {"encoding": "base64"}],
    });
    let client = reqwest::Client::new();
    let resp = client
        .post(rpc_url)
        .timeout(Duration::from_secs(10))
        .json(&body)
        .send()
        .await
        .map_err(|e| DevnetError::Tool {
            command: format!("getAccountInfo {address}"),
            detail: e.to_string(),
        })?;
    let parsed: AccountInfoResponse = resp.json().await.map_err(|e| DevnetError::Tool {
        command: format!("getAccountInfo {address}"),
        detail: format!("malformed RPC response: {e}"),
    })?;
    Ok(parsed.result.and_then(|r| r.value).is_some())
}
