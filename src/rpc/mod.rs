//! JSON-RPC subsystem.
//!
//! # Data Flow
//! ```text
//! BlockchainClient (typed method wrappers)
//!     → transport.rs (Transport trait, HTTP implementation)
//!     → types.rs (JSON-RPC 2.0 envelopes)
//!     → node
//! ```
//!
//! # Design Decisions
//! - Results stay untyped `serde_json::Value` here; decoding into method
//!   types happens once, in the client
//! - Method names live in `methods.rs` so call sites never spell them

pub mod methods;
pub mod transport;
pub mod types;

pub use transport::{HttpTransport, Transport};
pub use types::{JsonRpcErrorObject, JsonRpcRequest, JsonRpcResponse, RpcCall};
