//! Shared utilities for integration tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use zil_client::config::{RpcConfig, TrackerConfig};
use zil_client::rpc::Transport;
use zil_client::{BlockchainClient, BlockchainError, BlockchainResult};

/// Start a programmable JSON-RPC node on an ephemeral port.
///
/// The handler receives the decoded request body (object or batch array)
/// and returns the HTTP status and raw response body.
#[allow(dead_code)]
pub async fn start_mock_node<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let request = match read_request_body(&mut socket).await {
                            Some(body) => serde_json::from_slice(&body).unwrap_or(Value::Null),
                            None => return,
                        };
                        let (status, body) = f(request).await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Read headers and a `Content-Length` body.
async fn read_request_body(socket: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Some(buf[header_end..].to_vec())
}

/// `{"id", "jsonrpc", "result"}` answering `request`.
#[allow(dead_code)]
pub fn rpc_result(request: &Value, result: Value) -> String {
    json!({"id": request["id"], "jsonrpc": "2.0", "result": result}).to_string()
}

/// `{"id", "jsonrpc", "error"}` answering `request`.
#[allow(dead_code)]
pub fn rpc_error(request: &Value, code: i64, message: &str) -> String {
    json!({"id": request["id"], "jsonrpc": "2.0", "error": {"code": code, "message": message}})
        .to_string()
}

/// Transport that replays scripted replies per method.
///
/// Replies are consumed in order; the last one repeats forever.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<BlockchainResult<Value>>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply, so concurrent callers overlap.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push(&self, method: &str, reply: BlockchainResult<Value>) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, method: &str, _params: Vec<Value>) -> BlockchainResult<Value> {
        *self.calls.lock().unwrap().entry(method.to_string()).or_default() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(method) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Err(BlockchainError::Transport(format!("no scripted reply for {}", method))),
        }
    }
}

/// Client over a scripted transport.
#[allow(dead_code)]
pub fn scripted_client(transport: Arc<ScriptedTransport>) -> BlockchainClient {
    BlockchainClient::new(transport, RpcConfig::default())
}

/// Fast tracker settings for tests.
#[allow(dead_code)]
pub fn fast_tracker_config() -> TrackerConfig {
    TrackerConfig {
        poll_interval_ms: 10,
        max_attempts: Some(20),
        timeout_ms: Some(5_000),
        max_transport_retries: 5,
        backoff_base_ms: 1,
        backoff_max_ms: 5,
        event_buffer: 16,
    }
}

/// `GetTransaction` error for a hash the node hasn't seen.
#[allow(dead_code)]
pub fn not_present() -> BlockchainResult<Value> {
    Err(BlockchainError::Rpc {
        code: -20,
        message: "Txn Hash not Present".to_string(),
    })
}

/// `GetTransaction` result with a receipt.
#[allow(dead_code)]
pub fn included(success: bool) -> BlockchainResult<Value> {
    let receipt = if success {
        json!({"success": true, "cumulative_gas": "50", "epoch_num": "1021"})
    } else {
        json!({
            "success": false,
            "cumulative_gas": "50",
            "epoch_num": "1021",
            "errors": {"0": [7]},
            "exceptions": [{"line": 0, "message": "Insufficient balance"}]
        })
    };
    Ok(json!({"ID": "abc", "receipt": receipt}))
}
