//! Cryptographic primitives.
//!
//! # Data Flow
//! ```text
//! 32-byte digest + secret key
//!     → schnorr.rs (nonce derivation, commitment, response)
//!     → signature.rs (validated (r, s) pair, r || s encoding)
//! ```
//!
//! # Security Constraints
//! - Secret scalars never leave this module except inside `SecretKey`
//! - Every signature draws fresh OS entropy for its nonce
//! - Out-of-range signature components fail construction, not verification

pub mod schnorr;
pub mod signature;

pub use signature::Signature;
