//! Chain-specific types and error definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::blockchain::address::Address;

/// Node-assigned transaction identifier.
///
/// Stored as given by the node; [`TxId::normalized`] is the form used for
/// registry keys and RPC parameters (lowercase, no `0x`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase hex without the `0x` prefix.
    pub fn normalized(&self) -> String {
        let trimmed = self.0.trim();
        trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed)
            .to_ascii_lowercase()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TxId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    /// Constructed, possibly signed, not yet accepted by a node.
    Initialized,
    /// Accepted by a node, awaiting an on-chain outcome.
    Pending,
    /// Included on-chain with a successful receipt.
    Confirmed,
    /// Definitively failed on-chain or refused by the node.
    Rejected,
}

impl TxStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Rejected)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxStatus::Initialized => "initialized",
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during blockchain operations.
///
/// Variants never carry key material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockchainError {
    /// Private key is malformed, zero, or not below the curve order.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Signature components are malformed or out of range.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Address text could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// No key is held for the requested address.
    #[error("No key held for address {0}")]
    UnknownAddress(Address),

    /// Submission attempted without an attached signature.
    #[error("Transaction is not signed")]
    NotSigned,

    /// Tracking attempted on a transaction without a node-assigned id.
    #[error("Transaction has not been submitted")]
    NotSubmitted,

    /// Lifecycle transition not permitted from the current status.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: TxStatus, to: TxStatus },

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node could not be reached.
    #[error("Transport error: {0}")]
    Transport(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// The node replied with something that is not a valid response.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Tracking gave up without a definitive on-chain answer.
    #[error("Tracking failed: {0}")]
    TrackingFailed(String),

    /// Definitive negative on-chain outcome.
    #[error("Transaction rejected: {reason}")]
    Rejected { reason: String },

    /// Tracking was cancelled by the caller.
    #[error("Tracking cancelled")]
    Cancelled,

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BlockchainError {
    /// Connectivity failures a caller may retry.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BlockchainError::Transport(_) | BlockchainError::Timeout(_) | BlockchainError::Decode(_)
        )
    }

    /// JSON-RPC protocol and server errors (`-32768..=-32000`).
    ///
    /// These describe the node's handling of the request, not the
    /// transaction it refers to.
    pub fn is_server_error(&self) -> bool {
        matches!(self, BlockchainError::Rpc { code, .. } if (-32768..=-32000).contains(code))
    }

    /// Failures worth polling again: transport faults and node-side errors.
    pub fn is_retryable(&self) -> bool {
        self.is_transport() || self.is_server_error()
    }
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;
