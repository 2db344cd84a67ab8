//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment variable or raw bytes (private key)
//!     → wallet.rs (key custody, Schnorr signing)
//!     → transaction.rs (canonical digest, signature, submit or submit_batch)
//!     → client.rs (typed RPC wrappers over rpc::Transport)
//!     → tracker (confirmation polling)
//! ```
//!
//! # Security Constraints
//! - Private keys never leave the wallet and are zeroed on removal
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts
//! - A transaction only leaves `Pending` on a definitive on-chain answer

pub mod address;
pub mod client;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use address::Address;
pub use client::{Balance, BlockchainClient, TxLookup, TxReceipt};
pub use transaction::{pack_version, Transaction, TxParams};
pub use types::{BlockchainError, BlockchainResult, TxId, TxStatus};
pub use wallet::Wallet;
