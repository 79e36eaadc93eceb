//! Shared test doubles: a scriptable toolchain and a minimal HTTP endpoint
//! standing in for the validator's JSON-RPC port.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use agent_devnet::{DevnetError, Toolchain};

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Keygen(PathBuf),
    Airdrop { address: String, sol: f64 },
    Build { source: PathBuf },
    Deploy,
    CreateAccount { owner: String },
}

/// Toolchain double. Every call is recorded; deploy outcomes are scripted
/// per attempt and default to success once the script runs out.
#[derive(Default)]
pub struct MockToolchain {
    counter: AtomicU64,
    pub calls: Mutex<Vec<ToolCall>>,
    /// Front-to-back outcomes for successive deploy attempts. `Err` detail
    /// is surfaced as the tool's raw diagnostic.
    pub deploy_results: Mutex<VecDeque<Result<String, String>>>,
}

impl MockToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_deploys(&self, results: Vec<Result<&str, &str>>) {
        let mut queue = self.deploy_results.lock().unwrap();
        for result in results {
            queue.push_back(match result {
                Ok(out) => Ok(out.to_string()),
                Err(detail) => Err(detail.to_string()),
            });
        }
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_keygens(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ToolCall::Keygen(_)))
            .count()
    }

    pub fn count_deploys(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ToolCall::Deploy))
            .count()
    }

    pub fn airdrops(&self) -> Vec<(String, f64)> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                ToolCall::Airdrop { address, sol } => Some((address.clone(), *sol)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ToolCall) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Writes a well-formed 64-byte keypair file with a distinct public half.
pub fn write_keypair(path: &Path, seed: u64) {
    let mut bytes = vec![0u8; 64];
    bytes[32..40].copy_from_slice(&seed.to_le_bytes());
    bytes[40] = 1;
    fs::write(path, serde_json::to_string(&bytes).unwrap()).unwrap();
}

#[async_trait]
impl Toolchain for MockToolchain {
    async fn keygen_new(&self, out: &Path) -> Result<(), DevnetError> {
        let seed = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        write_keypair(out, seed);
        self.record(ToolCall::Keygen(out.to_path_buf()));
        Ok(())
    }

    async fn airdrop(&self, address: &str, sol: f64, _rpc_url: &str) -> Result<(), DevnetError> {
        self.record(ToolCall::Airdrop {
            address: address.to_string(),
            sol,
        });
        Ok(())
    }

    async fn build_program(
        &self,
        source_dir: &Path,
        artifact_dir: &Path,
    ) -> Result<(), DevnetError> {
        fs::write(artifact_dir.join("counter.so"), b"\x7fELF-mock").map_err(|e| {
            DevnetError::Build {
                detail: e.to_string(),
            }
        })?;
        self.record(ToolCall::Build {
            source: source_dir.to_path_buf(),
        });
        Ok(())
    }

    async fn deploy_program(
        &self,
        _artifact: &Path,
        _program_keypair: &Path,
        _payer: &Path,
        _rpc_url: &str,
    ) -> Result<String, DevnetError> {
        self.record(ToolCall::Deploy);
        let scripted = self.deploy_results.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(out)) => Ok(out),
            Some(Err(detail)) => Err(DevnetError::Tool {
                command: "solana program deploy".to_string(),
                detail,
            }),
            None => Ok("Program Id: MockProgram1111111111111111111111".to_string()),
        }
    }

    async fn create_account(
        &self,
        _account_keypair: &Path,
        owner: &str,
        _sol: f64,
        _payer: &Path,
        _rpc_url: &str,
    ) -> Result<(), DevnetError> {
        self.record(ToolCall::CreateAccount {
            owner: owner.to_string(),
        });
        Ok(())
    }
}

/// A bare HTTP endpoint on a random local port, answering `getHealth` with
/// 200 or 500 and `getAccountInfo` per the `has_account` flag. Counts
/// accepted connections so probe bounds can be asserted.
pub struct FakeRpc {
    pub port: u16,
    pub connections: Arc<AtomicUsize>,
    pub healthy: Arc<AtomicBool>,
    pub has_account: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeRpc {
    pub async fn start(healthy: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let healthy_flag = Arc::new(AtomicBool::new(healthy));
        let has_account = Arc::new(AtomicBool::new(false));

        let conns = connections.clone();
        let healthy_srv = healthy_flag.clone();
        let account_srv = has_account.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                conns.fetch_add(1, Ordering::SeqCst);
                let healthy = healthy_srv.load(Ordering::SeqCst);
                let has_account = account_srv.load(Ordering::SeqCst);
                tokio::spawn(async move {
                    let request = read_request(&mut stream).await;
                    let (status, body) = if request.contains("getAccountInfo") {
                        let value = if has_account {
                            r#"{"lamports":1,"owner":"Mock"}"#
                        } else {
                            "null"
                        };
                        (
                            "200 OK",
                            format!(
                                r#"{{"jsonrpc":"2.0","result":{{"context":{{"slot":1}},"value":{value}}},"id":1}}"#
                            ),
                        )
                    } else if healthy {
                        ("200 OK", r#"{"jsonrpc":"2.0","result":"ok","id":1}"#.to_string())
                    } else {
                        (
                            "500 Internal Server Error",
                            r#"{"jsonrpc":"2.0","error":{"code":-32005,"message":"node is behind"},"id":1}"#
                                .to_string(),
                        )
                    };
                    let response = format!(
                        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            port,
            connections,
            healthy: healthy_flag,
            has_account,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for FakeRpc {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Reads headers plus the content-length body of one request.
async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            break;
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
