//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Tracker poll fails at the transport level
//!     → backoff.rs (exponential delay with jitter before the next poll)
//! ```
//!
//! # Design Decisions
//! - The transport never retries; retry policy lives with the caller
//! - Jittered backoff prevents many trackers hammering a recovering node in lockstep

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
