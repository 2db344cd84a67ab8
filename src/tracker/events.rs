//! Events published by a tracking session.

use std::fmt;

use crate::blockchain::client::TxReceipt;
use crate::blockchain::types::{BlockchainError, BlockchainResult, TxId};

/// One observation about a tracked transaction.
///
/// `Pending` may be followed by any other event; every other variant is the
/// last event of its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingEvent {
    /// The node doesn't report an outcome yet.
    Pending { id: TxId, attempt: u32 },
    /// Included with a successful receipt.
    Confirmed { id: TxId, receipt: TxReceipt },
    /// Definitively refused or failed on-chain.
    Rejected { id: TxId, reason: String },
    /// Budget exhausted while the node kept answering "not yet".
    TimedOut { id: TxId, attempts: u32 },
    /// Gave up because the node could not be reached.
    TrackingFailed { id: TxId, attempts: u32, reason: String },
    /// Stopped on request.
    Cancelled { id: TxId },
}

impl TrackingEvent {
    pub fn id(&self) -> &TxId {
        match self {
            TrackingEvent::Pending { id, .. }
            | TrackingEvent::Confirmed { id, .. }
            | TrackingEvent::Rejected { id, .. }
            | TrackingEvent::TimedOut { id, .. }
            | TrackingEvent::TrackingFailed { id, .. }
            | TrackingEvent::Cancelled { id } => id,
        }
    }

    /// Whether this event ends its session.
    pub fn is_final(&self) -> bool {
        !matches!(self, TrackingEvent::Pending { .. })
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            TrackingEvent::Pending { .. } => "pending",
            TrackingEvent::Confirmed { .. } => "confirmed",
            TrackingEvent::Rejected { .. } => "rejected",
            TrackingEvent::TimedOut { .. } => "timed_out",
            TrackingEvent::TrackingFailed { .. } => "tracking_failed",
            TrackingEvent::Cancelled { .. } => "cancelled",
        }
    }
}

impl fmt::Display for TrackingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingEvent::Pending { id, attempt } => write!(f, "{} pending (poll {})", id, attempt),
            TrackingEvent::Confirmed { id, .. } => write!(f, "{} confirmed", id),
            TrackingEvent::Rejected { id, reason } => write!(f, "{} rejected: {}", id, reason),
            TrackingEvent::TimedOut { id, attempts } => {
                write!(f, "{} still pending after {} polls", id, attempts)
            }
            TrackingEvent::TrackingFailed { id, reason, .. } => {
                write!(f, "{} tracking failed: {}", id, reason)
            }
            TrackingEvent::Cancelled { id } => write!(f, "{} tracking cancelled", id),
        }
    }
}

/// How a tracking session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingOutcome {
    Confirmed(TxReceipt),
    Rejected(String),
    TimedOut { attempts: u32 },
    TrackingFailed { attempts: u32, reason: String },
    Cancelled,
}

impl TrackingOutcome {
    /// The outcome a final event carries; `None` for `Pending`.
    pub fn from_event(event: &TrackingEvent) -> Option<Self> {
        match event {
            TrackingEvent::Pending { .. } => None,
            TrackingEvent::Confirmed { receipt, .. } => Some(Self::Confirmed(receipt.clone())),
            TrackingEvent::Rejected { reason, .. } => Some(Self::Rejected(reason.clone())),
            TrackingEvent::TimedOut { attempts, .. } => Some(Self::TimedOut { attempts: *attempts }),
            TrackingEvent::TrackingFailed { attempts, reason, .. } => Some(Self::TrackingFailed {
                attempts: *attempts,
                reason: reason.clone(),
            }),
            TrackingEvent::Cancelled { .. } => Some(Self::Cancelled),
        }
    }

    /// Whether the chain gave a definitive answer.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackingOutcome::Confirmed(_) | TrackingOutcome::Rejected(_))
    }

    /// Receipt on confirmation, a typed error otherwise.
    pub fn into_result(self) -> BlockchainResult<TxReceipt> {
        match self {
            TrackingOutcome::Confirmed(receipt) => Ok(receipt),
            TrackingOutcome::Rejected(reason) => Err(BlockchainError::Rejected { reason }),
            TrackingOutcome::TimedOut { attempts } => Err(BlockchainError::TrackingFailed(format!(
                "no outcome after {} polls",
                attempts
            ))),
            TrackingOutcome::TrackingFailed { reason, .. } => Err(BlockchainError::TrackingFailed(reason)),
            TrackingOutcome::Cancelled => Err(BlockchainError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt() -> TxReceipt {
        TxReceipt {
            success: true,
            cumulative_gas: Some(50),
            epoch_num: Some(7),
            errors: None,
            exceptions: Vec::new(),
        }
    }

    #[test]
    fn test_only_pending_is_not_final() {
        let id = TxId::from("abc");
        assert!(!TrackingEvent::Pending { id: id.clone(), attempt: 1 }.is_final());
        assert!(TrackingEvent::Cancelled { id: id.clone() }.is_final());
        assert!(TrackingEvent::TimedOut { id, attempts: 3 }.is_final());
    }

    #[test]
    fn test_outcome_mapping() {
        let id = TxId::from("abc");
        let confirmed = TrackingEvent::Confirmed {
            id: id.clone(),
            receipt: receipt(),
        };
        assert_eq!(
            TrackingOutcome::from_event(&confirmed),
            Some(TrackingOutcome::Confirmed(receipt()))
        );
        assert_eq!(
            TrackingOutcome::from_event(&TrackingEvent::Pending { id, attempt: 1 }),
            None
        );
    }

    #[test]
    fn test_outcome_into_result() {
        assert_eq!(TrackingOutcome::Confirmed(receipt()).into_result(), Ok(receipt()));
        assert_eq!(
            TrackingOutcome::Rejected("bad nonce".into()).into_result(),
            Err(BlockchainError::Rejected {
                reason: "bad nonce".into()
            })
        );
        assert!(matches!(
            TrackingOutcome::TimedOut { attempts: 3 }.into_result(),
            Err(BlockchainError::TrackingFailed(_))
        ));
        assert_eq!(TrackingOutcome::Cancelled.into_result(), Err(BlockchainError::Cancelled));
        assert!(!TrackingOutcome::Cancelled.is_terminal());
    }

    #[test]
    fn test_display() {
        let event = TrackingEvent::Rejected {
            id: TxId::from("abc"),
            reason: "insufficient balance".into(),
        };
        assert_eq!(event.to_string(), "abc rejected: insufficient balance");
        assert_eq!(event.label(), "rejected");
    }
}
