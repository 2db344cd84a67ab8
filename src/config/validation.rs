//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate the RPC endpoint URL
//! - Validate value ranges (timeouts > 0, tracking bounded)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::{ClientConfig, RpcConfig, TrackerConfig};

/// A single failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Run every check and collect the failures.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    validate_rpc(&config.rpc, &mut errors);
    validate_tracker(&config.tracker, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Checks that apply to a tracking session on their own.
pub fn validate_tracker_config(tracker: &TrackerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    validate_tracker(tracker, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_rpc(rpc: &RpcConfig, errors: &mut Vec<ValidationError>) {
    match url::Url::parse(&rpc.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            "rpc.url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("rpc.url", format!("invalid URL: {}", e))),
    }

    if rpc.timeout_secs == 0 {
        errors.push(ValidationError::new("rpc.timeout_secs", "must be greater than 0"));
    }
}

fn validate_tracker(tracker: &TrackerConfig, errors: &mut Vec<ValidationError>) {
    if tracker.poll_interval_ms == 0 {
        errors.push(ValidationError::new(
            "tracker.poll_interval_ms",
            "must be greater than 0",
        ));
    }

    match (tracker.max_attempts, tracker.timeout_ms) {
        (None, None) => errors.push(ValidationError::new(
            "tracker",
            "at least one of max_attempts or timeout_ms must be set",
        )),
        (Some(0), _) => errors.push(ValidationError::new(
            "tracker.max_attempts",
            "must be greater than 0",
        )),
        (_, Some(0)) => errors.push(ValidationError::new(
            "tracker.timeout_ms",
            "must be greater than 0",
        )),
        _ => {}
    }

    if tracker.backoff_max_ms < tracker.backoff_base_ms {
        errors.push(ValidationError::new(
            "tracker.backoff_max_ms",
            "must not be smaller than backoff_base_ms",
        ));
    }

    if tracker.event_buffer == 0 {
        errors.push(ValidationError::new(
            "tracker.event_buffer",
            "must be greater than 0",
        ));
    }
}
