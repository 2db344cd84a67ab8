//! JSON-RPC transport.
//!
//! # Responsibilities
//! - Send single and batched JSON-RPC 2.0 calls to a node
//! - Map every failure onto a typed [`BlockchainError`]
//! - Enforce a per-request deadline
//!
//! # Design Decisions
//! - No retries here; callers that want them (the tracker) own the policy
//! - The trait is the seam tests use to script node behaviour
//! - Request ids are process-unique and only used to pair batch replies

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::observability::metrics;
use crate::rpc::types::{JsonRpcRequest, JsonRpcResponse, RpcCall};

/// A connection to a JSON-RPC node.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Invoke one method and return its `result`.
    async fn send(&self, method: &str, params: Vec<Value>) -> BlockchainResult<Value>;

    /// Invoke several methods.
    ///
    /// The outer error is for the exchange as a whole; each inner result is
    /// that call's outcome, in request order.
    async fn send_batch(&self, calls: Vec<RpcCall>) -> BlockchainResult<Vec<BlockchainResult<Value>>> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.send(&call.method, call.params).await);
        }
        Ok(results)
    }
}

/// JSON-RPC over HTTP POST.
pub struct HttpTransport {
    client: reqwest::Client,
    url: url::Url,
    timeout: Duration,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Build a transport for `url` with a per-request timeout.
    pub fn new(url: &str, timeout: Duration) -> BlockchainResult<Self> {
        let url: url::Url = url
            .parse()
            .map_err(|e| BlockchainError::Config(format!("Invalid RPC URL '{}': {}", url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BlockchainError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &url::Url {
        &self.url
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// POST a body and return the decoded JSON reply.
    async fn post<T: serde::Serialize + ?Sized>(&self, body: &T) -> BlockchainResult<Value> {
        let response = self
            .client
            .post(self.url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_reqwest_error(e))?;

        if !status.is_success() {
            // Some nodes send JSON-RPC errors with a 5xx status.
            if let Ok(reply) = serde_json::from_str::<JsonRpcResponse>(&text) {
                if let Some(err) = reply.error {
                    return Err(BlockchainError::Rpc {
                        code: err.code,
                        message: err.message,
                    });
                }
            }
            return Err(BlockchainError::Transport(format!("HTTP {} from node", status)));
        }

        serde_json::from_str(&text)
            .map_err(|e| BlockchainError::Decode(format!("invalid JSON reply: {}", e)))
    }

    fn map_reqwest_error(&self, err: reqwest::Error) -> BlockchainError {
        if err.is_timeout() {
            BlockchainError::Timeout(self.timeout.as_secs())
        } else if err.is_decode() {
            BlockchainError::Decode(err.to_string())
        } else {
            BlockchainError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, method: &str, params: Vec<Value>) -> BlockchainResult<Value> {
        let id = self.next_id();
        let request = JsonRpcRequest::new(id, method, params);
        let started = Instant::now();

        tracing::debug!(method = %method, id, "RPC request");

        let result = self.post(&request).await.and_then(|reply| decode_single(reply, id));

        let outcome = match &result {
            Ok(_) => "ok",
            Err(BlockchainError::Rpc { .. }) => "rpc_error",
            Err(_) => "transport_error",
        };
        metrics::record_rpc_call(method, outcome, started.elapsed());

        if let Err(e) = &result {
            tracing::debug!(method = %method, id, error = %e, "RPC request failed");
        }
        result
    }

    async fn send_batch(&self, calls: Vec<RpcCall>) -> BlockchainResult<Vec<BlockchainResult<Value>>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<JsonRpcRequest> = calls
            .into_iter()
            .map(|call| JsonRpcRequest::new(self.next_id(), call.method, call.params))
            .collect();
        let started = Instant::now();

        tracing::debug!(calls = requests.len(), "RPC batch request");

        let reply = self.post(&requests).await;
        metrics::record_rpc_call(
            "batch",
            if reply.is_ok() { "ok" } else { "transport_error" },
            started.elapsed(),
        );

        decode_batch(reply?, &requests)
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url.as_str())
            .field("timeout_secs", &self.timeout.as_secs())
            .finish()
    }
}

fn decode_single(reply: Value, expected_id: u64) -> BlockchainResult<Value> {
    let reply: JsonRpcResponse = serde_json::from_value(reply)
        .map_err(|e| BlockchainError::Decode(format!("malformed JSON-RPC reply: {}", e)))?;

    // A null id is allowed on error replies to unparseable requests.
    if let Some(id) = reply.numeric_id() {
        if id != expected_id {
            return Err(BlockchainError::Decode(format!(
                "reply id {} does not match request id {}",
                id, expected_id
            )));
        }
    }
    reply.into_result()
}

fn decode_batch(
    reply: Value,
    requests: &[JsonRpcRequest],
) -> BlockchainResult<Vec<BlockchainResult<Value>>> {
    let items = match reply {
        Value::Array(items) => items,
        // A single object answering a batch is an error for the whole batch.
        other => {
            let reply: JsonRpcResponse = serde_json::from_value(other)
                .map_err(|e| BlockchainError::Decode(format!("malformed batch reply: {}", e)))?;
            reply.into_result()?;
            return Err(BlockchainError::Decode("batch reply is not an array".to_string()));
        }
    };

    // A malformed item only fails its own slot, when its id can be read.
    let mut by_id: HashMap<u64, BlockchainResult<Value>> = HashMap::with_capacity(items.len());
    for item in items {
        let raw_id = item.get("id").and_then(Value::as_u64);
        match serde_json::from_value::<JsonRpcResponse>(item) {
            Ok(reply) => {
                if let Some(id) = reply.numeric_id() {
                    by_id.insert(id, reply.into_result());
                }
            }
            Err(e) => {
                if let Some(id) = raw_id {
                    by_id.insert(
                        id,
                        Err(BlockchainError::Decode(format!("malformed batch item: {}", e))),
                    );
                }
            }
        }
    }

    Ok(requests
        .iter()
        .map(|request| match by_id.remove(&request.id) {
            Some(result) => result,
            None => Err(BlockchainError::Decode(format!(
                "no reply for request id {} ({})",
                request.id, request.method
            ))),
        })
        .collect())
}
