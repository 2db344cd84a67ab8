//! Zilliqa client core: key custody, Schnorr signing, JSON-RPC submission
//! and confirmation tracking.

// Core subsystems
pub mod blockchain;
pub mod crypto;
pub mod rpc;
pub mod tracker;

// Cross-cutting concerns
pub mod config;
pub mod observability;
pub mod resilience;

pub use blockchain::{
    Address, BlockchainClient, BlockchainError, BlockchainResult, Transaction, TxId, TxParams,
    TxStatus, Wallet,
};
pub use config::ClientConfig;
pub use crypto::Signature;
pub use tracker::{Subscription, TrackingEvent, TrackingOutcome, TransactionTracker};
