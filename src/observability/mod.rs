//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! RPC transport, client, tracker produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout via the fmt layer
//!     → whatever metrics recorder the embedding binary installs
//! ```
//!
//! # Design Decisions
//! - Addresses and transaction ids are logged as fields; keys never are
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
