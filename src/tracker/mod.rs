//! Transaction tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Transaction::submit → TxId
//!     → monitor.rs (one polling task per id, GetTransaction each tick)
//!     → events.rs (Pending, then one final event)
//!     → Subscription (ordered events, or wait() for the outcome)
//!     → TransactionTracker::confirm applies Confirmed/Rejected to the Transaction
//! ```
//!
//! # Design Decisions
//! - Tasks and channels instead of callbacks
//! - Timeouts, unreachable nodes and node-side RPC errors are not outcomes:
//!   the transaction stays `Pending`
//! - Cancellation is shared: any subscriber can stop the session

pub mod events;
pub mod monitor;

pub use events::{TrackingEvent, TrackingOutcome};
pub use monitor::{Subscription, TransactionTracker};
