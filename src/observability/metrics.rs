//! Metrics collection.
//!
//! # Responsibilities
//! - Name the client's metrics in one place
//! - Give call sites small `record_*` helpers instead of raw macros
//!
//! # Metrics
//! - `zil_rpc_requests_total` (counter): RPC calls by method, outcome
//! - `zil_rpc_request_duration_seconds` (histogram): RPC latency by method
//! - `zil_tx_submissions_total` (counter): submissions by outcome
//! - `zil_tracking_outcomes_total` (counter): finished tracking sessions by outcome
//! - `zil_tracking_active` (gauge): in-flight tracking sessions
//! - `zil_node_health` (gauge): 1=reachable, 0=unreachable
//!
//! # Design Decisions
//! - The library records into whatever recorder the binary installed; without
//!   one every call is a no-op
//! - Outcome labels are a fixed `&'static str` set to keep cardinality bounded

use ::metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record one RPC round trip.
pub fn record_rpc_call(method: &str, outcome: &'static str, elapsed: Duration) {
    counter!(
        "zil_rpc_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("zil_rpc_request_duration_seconds", "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

/// Record a transaction submission attempt.
pub fn record_submission(outcome: &'static str) {
    counter!("zil_tx_submissions_total", "outcome" => outcome).increment(1);
}

/// Record how a tracking session ended.
pub fn record_tracking_outcome(outcome: &'static str) {
    counter!("zil_tracking_outcomes_total", "outcome" => outcome).increment(1);
}

/// Current number of in-flight tracking sessions.
pub fn record_active_tracking(count: usize) {
    gauge!("zil_tracking_active").set(count as f64);
}

/// Node reachability as seen by the last health check.
pub fn record_node_health(healthy: bool) {
    gauge!("zil_node_health").set(if healthy { 1.0 } else { 0.0 });
}
