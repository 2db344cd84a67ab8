//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the client.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Node endpoint and chain parameters.
    pub rpc: RpcConfig,

    /// Confirmation polling settings.
    pub tracker: TrackerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Node endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL.
    pub url: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Chain identifier folded into the transaction version.
    pub chain_id: u16,

    /// Message version folded into the transaction version.
    pub msg_version: u16,
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "https://dev-api.zilliqa.com".to_string(),
            timeout_secs: 10,
            chain_id: 333,
            msg_version: 1,
        }
    }
}

/// Transaction tracker configuration.
///
/// At least one of `max_attempts` and `timeout_ms` must be set so that every
/// tracking session is bounded.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Gap between polls while the node reports "not yet".
    pub poll_interval_ms: u64,

    /// Maximum number of polls per session.
    pub max_attempts: Option<u32>,

    /// Wall-clock budget per session.
    pub timeout_ms: Option<u64>,

    /// Consecutive transport failures tolerated before giving up.
    pub max_transport_retries: u32,

    /// Base delay for backoff after a transport failure.
    pub backoff_base_ms: u64,

    /// Upper bound on the backoff delay.
    pub backoff_max_ms: u64,

    /// Capacity of the per-transaction event channel.
    pub event_buffer: usize,
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_attempts: Some(33),
            timeout_ms: Some(300_000),
            max_transport_retries: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
            event_buffer: 32,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level for this crate when `RUST_LOG` is unset.
    pub log_level: String,

    /// Include the event target (module path) in log lines.
    pub show_target: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            show_target: false,
        }
    }
}
