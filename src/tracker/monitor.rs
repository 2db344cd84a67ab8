//! Confirmation polling.
//!
//! # Responsibilities
//! - Run one polling task per transaction id, shared by all subscribers
//! - Classify each poll and publish status events in order
//! - Stop on a final outcome, budget exhaustion or cancellation
//! - Bound every status lookup by the session deadline
//! - Remove the task's registry entry on every exit path
//!
//! # Design Decisions
//! - The registry maps the normalized id to a handle; a session number
//!   guards against a finishing task removing a newer session's entry
//! - Each handle keeps the latest event in a `watch` so subscribers that
//!   attach late still see the outcome
//! - A final event is written to `latest` and the entry removed before the
//!   event is broadcast
//! - Node-side JSON-RPC errors are retried like transport faults; only a
//!   failed receipt or an error about the transaction itself is a rejection

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

use crate::blockchain::client::{BlockchainClient, TxLookup, TxReceipt};
use crate::blockchain::transaction::Transaction;
use crate::blockchain::types::{BlockchainError, BlockchainResult, TxId, TxStatus};
use crate::config::validation::validate_tracker_config;
use crate::config::TrackerConfig;
use crate::observability::metrics;
use crate::resilience::Backoff;
use crate::tracker::events::{TrackingEvent, TrackingOutcome};

type Registry = DashMap<String, TrackingHandle>;

struct TrackingHandle {
    session: u64,
    events: broadcast::Sender<TrackingEvent>,
    latest: watch::Receiver<Option<TrackingEvent>>,
    cancel: Arc<watch::Sender<bool>>,
}

impl TrackingHandle {
    fn subscribe(&self, id: &TxId) -> Subscription {
        Subscription {
            id: id.clone(),
            events: self.events.subscribe(),
            latest: self.latest.clone(),
            cancel: self.cancel.clone(),
            finished: false,
        }
    }
}

/// A caller's view of one tracking session.
///
/// Dropping a subscription does not stop the session; use [`Subscription::cancel`].
pub struct Subscription {
    id: TxId,
    events: broadcast::Receiver<TrackingEvent>,
    latest: watch::Receiver<Option<TrackingEvent>>,
    cancel: Arc<watch::Sender<bool>>,
    finished: bool,
}

impl Subscription {
    pub fn id(&self) -> &TxId {
        &self.id
    }

    /// Most recent event of the session, if any.
    pub fn latest(&self) -> Option<TrackingEvent> {
        self.latest.borrow().clone()
    }

    /// Stop the session for every subscriber.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Next event in order; `None` once the final event has been returned.
    pub async fn next_event(&mut self) -> Option<TrackingEvent> {
        while !self.finished {
            match self.events.recv().await {
                Ok(event) => {
                    self.finished = event.is_final();
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(tx_id = %self.id, skipped, "Subscriber lagged behind tracking events");
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return self.latest().filter(TrackingEvent::is_final);
                }
            }
        }
        None
    }

    /// Wait for the session to end.
    pub async fn wait(mut self) -> TrackingOutcome {
        loop {
            if let Some(outcome) = self.latest_outcome() {
                return outcome;
            }
            match self.events.recv().await {
                Ok(event) => {
                    if let Some(outcome) = TrackingOutcome::from_event(&event) {
                        return outcome;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => {
                    return self.latest_outcome().unwrap_or_else(|| TrackingOutcome::TrackingFailed {
                        attempts: 0,
                        reason: "tracking task ended without an outcome".to_string(),
                    });
                }
            }
        }
    }

    fn latest_outcome(&self) -> Option<TrackingOutcome> {
        self.latest.borrow().as_ref().and_then(TrackingOutcome::from_event)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Tracks submitted transactions until the chain gives an answer.
///
/// Cloning shares the registry, so clones never poll the same id twice.
/// Tracking spawns onto the current tokio runtime.
#[derive(Clone)]
pub struct TransactionTracker {
    client: BlockchainClient,
    config: TrackerConfig,
    registry: Arc<Registry>,
    sessions: Arc<AtomicU64>,
}

impl TransactionTracker {
    /// Fails with [`BlockchainError::Config`] if `config` would poll without bound.
    pub fn new(client: BlockchainClient, config: TrackerConfig) -> BlockchainResult<Self> {
        check_config(&config)?;
        Ok(Self {
            client,
            config,
            registry: Arc::new(DashMap::new()),
            sessions: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Track `id` with the tracker's configuration.
    pub fn track(&self, id: &TxId) -> Subscription {
        self.subscribe(id, self.config.clone())
    }

    /// Track `id` with a per-session configuration, attaching to the
    /// running session if there is one.
    ///
    /// `config` only applies when a new session is started. It is checked
    /// like the tracker's own configuration.
    pub fn track_with(&self, id: &TxId, config: TrackerConfig) -> BlockchainResult<Subscription> {
        check_config(&config)?;
        Ok(self.subscribe(id, config))
    }

    fn subscribe(&self, id: &TxId, config: TrackerConfig) -> Subscription {
        let key = id.normalized();

        let (subscription, poller) = match self.registry.entry(key.clone()) {
            Entry::Occupied(entry) => {
                tracing::debug!(tx_id = %id, "Attaching to running tracking session");
                (entry.get().subscribe(id), None)
            }
            Entry::Vacant(entry) => {
                let session = self.sessions.fetch_add(1, Ordering::Relaxed);
                let (events_tx, _) = broadcast::channel(config.event_buffer.max(1));
                let (latest_tx, latest_rx) = watch::channel(None);
                let (cancel_tx, cancel_rx) = watch::channel(false);

                let handle = TrackingHandle {
                    session,
                    events: events_tx.clone(),
                    latest: latest_rx,
                    cancel: Arc::new(cancel_tx),
                };
                let subscription = handle.subscribe(id);
                entry.insert(handle);

                let poller = Poller {
                    id: id.clone(),
                    client: self.client.clone(),
                    backoff: Backoff::new(config.backoff_base_ms, config.backoff_max_ms),
                    config,
                    events: events_tx,
                    latest: latest_tx,
                    cancel: cancel_rx,
                    guard: RegistryGuard {
                        registry: self.registry.clone(),
                        key,
                        session,
                    },
                };
                (subscription, Some(poller))
            }
        };

        if let Some(poller) = poller {
            metrics::record_active_tracking(self.registry.len());
            tokio::spawn(poller.run());
        }
        subscription
    }

    /// Cancel the session for `id`. Returns `false` if none was running.
    pub fn cancel(&self, id: &TxId) -> bool {
        match self.registry.get(&id.normalized()) {
            Some(handle) => {
                handle.cancel.send_replace(true);
                true
            }
            None => false,
        }
    }

    /// Cancel every running session.
    pub fn shutdown(&self) {
        let count = self.registry.len();
        for handle in self.registry.iter() {
            handle.cancel.send_replace(true);
        }
        tracing::info!(sessions = count, "Transaction tracker shutting down");
    }

    pub fn is_tracking(&self, id: &TxId) -> bool {
        self.registry.contains_key(&id.normalized())
    }

    /// Number of in-flight sessions.
    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    /// Track a submitted transaction and apply the on-chain outcome to it.
    ///
    /// `Confirmed` and `Rejected` update the transaction; timeouts, tracking
    /// failures and cancellation leave it `Pending`.
    pub async fn confirm(&self, tx: &mut Transaction) -> BlockchainResult<TxReceipt> {
        let id = pending_id(tx)?;
        let outcome = self.track(&id).wait().await;
        apply_outcome(tx, outcome)
    }

    /// [`confirm`](Self::confirm) for several transactions at once.
    ///
    /// All sessions start before the first one is awaited. Results are in
    /// input order.
    pub async fn confirm_batch(&self, txs: &mut [Transaction]) -> Vec<BlockchainResult<TxReceipt>> {
        let subscriptions: Vec<BlockchainResult<Subscription>> = txs
            .iter()
            .map(|tx| pending_id(tx).map(|id| self.track(&id)))
            .collect();

        let mut results = Vec::with_capacity(txs.len());
        for (tx, subscription) in txs.iter_mut().zip(subscriptions) {
            let result = match subscription {
                Ok(subscription) => apply_outcome(tx, subscription.wait().await),
                Err(e) => Err(e),
            };
            results.push(result);
        }
        results
    }
}

fn pending_id(tx: &Transaction) -> BlockchainResult<TxId> {
    let id = tx.id().cloned().ok_or(BlockchainError::NotSubmitted)?;
    if tx.status() != TxStatus::Pending {
        return Err(BlockchainError::InvalidTransition {
            from: tx.status(),
            to: TxStatus::Confirmed,
        });
    }
    Ok(id)
}

fn apply_outcome(tx: &mut Transaction, outcome: TrackingOutcome) -> BlockchainResult<TxReceipt> {
    match &outcome {
        TrackingOutcome::Confirmed(receipt) => tx.mark_confirmed(receipt.clone())?,
        TrackingOutcome::Rejected(reason) => tx.mark_rejected(reason.clone())?,
        _ => {}
    }
    outcome.into_result()
}

impl std::fmt::Debug for TransactionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionTracker")
            .field("active", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

fn check_config(config: &TrackerConfig) -> BlockchainResult<()> {
    validate_tracker_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        BlockchainError::Config(messages.join("; "))
    })
}

/// Removes this session's registry entry when dropped.
struct RegistryGuard {
    registry: Arc<Registry>,
    key: String,
    session: u64,
}

impl RegistryGuard {
    fn release(&self) {
        let session = self.session;
        if self
            .registry
            .remove_if(&self.key, |_, handle| handle.session == session)
            .is_some()
        {
            metrics::record_active_tracking(self.registry.len());
        }
    }
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.release();
    }
}

enum Step {
    Lookup(BlockchainResult<TxLookup>),
    Expired,
    Cancelled,
}

/// Resolves at `deadline`, or never.
async fn deadline_reached(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// The polling task of one session.
struct Poller {
    id: TxId,
    client: BlockchainClient,
    config: TrackerConfig,
    backoff: Backoff,
    events: broadcast::Sender<TrackingEvent>,
    latest: watch::Sender<Option<TrackingEvent>>,
    cancel: watch::Receiver<bool>,
    guard: RegistryGuard,
}

impl Poller {
    async fn run(mut self) {
        let started = Instant::now();
        let deadline = self
            .config
            .timeout()
            .map(|limit| tokio::time::Instant::from_std(started + limit));
        let poll_interval = self.config.poll_interval();
        let mut attempts: u32 = 0;
        let mut consecutive_failures: u32 = 0;
        let mut last_failure: Option<String> = None;
        let mut announced = false;

        tracing::debug!(
            tx_id = %self.id,
            poll_interval_ms = self.config.poll_interval_ms,
            max_attempts = ?self.config.max_attempts,
            timeout_ms = ?self.config.timeout_ms,
            "Tracking started"
        );

        let last = loop {
            if *self.cancel.borrow() {
                break self.cancelled();
            }
            attempts += 1;

            // A reply that is already available wins over an expired deadline.
            let step = tokio::select! {
                biased;
                _ = self.cancel.changed() => Step::Cancelled,
                result = self.client.get_transaction(&self.id) => Step::Lookup(result),
                _ = deadline_reached(deadline) => Step::Expired,
            };
            let lookup = match step {
                Step::Lookup(lookup) => lookup,
                Step::Cancelled => break self.cancelled(),
                Step::Expired => {
                    tracing::warn!(tx_id = %self.id, attempt = attempts, "Status poll still in flight at the tracking deadline");
                    break TrackingEvent::TrackingFailed {
                        id: self.id.clone(),
                        attempts,
                        reason: "no reply from the node before the tracking deadline".to_string(),
                    };
                }
            };

            let delay = match lookup {
                Ok(TxLookup::NotFound) => {
                    consecutive_failures = 0;
                    last_failure = None;
                    if !announced {
                        announced = true;
                        self.publish(TrackingEvent::Pending {
                            id: self.id.clone(),
                            attempt: attempts,
                        });
                    }
                    poll_interval
                }
                Ok(TxLookup::Confirmed(receipt)) => {
                    break TrackingEvent::Confirmed {
                        id: self.id.clone(),
                        receipt,
                    };
                }
                Ok(TxLookup::Failed { reason, .. }) => {
                    break TrackingEvent::Rejected {
                        id: self.id.clone(),
                        reason,
                    };
                }
                Err(e) if e.is_retryable() => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        tx_id = %self.id,
                        attempt = attempts,
                        failures = consecutive_failures,
                        error = %e,
                        "Status poll failed"
                    );
                    if consecutive_failures > self.config.max_transport_retries {
                        break TrackingEvent::TrackingFailed {
                            id: self.id.clone(),
                            attempts,
                            reason: format!(
                                "gave up after {} consecutive failures: {}",
                                consecutive_failures, e
                            ),
                        };
                    }
                    last_failure = Some(e.to_string());
                    self.backoff.delay(consecutive_failures)
                }
                // The node refused this transaction id.
                Err(e) => {
                    break TrackingEvent::Rejected {
                        id: self.id.clone(),
                        reason: e.to_string(),
                    };
                }
            };

            let out_of_attempts = self.config.max_attempts.map_or(false, |max| attempts >= max);
            let out_of_time = self
                .config
                .timeout()
                .map_or(false, |limit| started.elapsed() + delay > limit);

            if out_of_attempts || out_of_time {
                break match last_failure.take() {
                    Some(reason) => TrackingEvent::TrackingFailed {
                        id: self.id.clone(),
                        attempts,
                        reason,
                    },
                    None => TrackingEvent::TimedOut {
                        id: self.id.clone(),
                        attempts,
                    },
                };
            }

            let cancelled = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = self.cancel.changed() => true,
            };
            if cancelled {
                break self.cancelled();
            }
        };

        self.finish(last, started);
    }

    fn cancelled(&self) -> TrackingEvent {
        TrackingEvent::Cancelled { id: self.id.clone() }
    }

    fn publish(&self, event: TrackingEvent) {
        tracing::debug!(tx_id = %self.id, event = event.label(), "Tracking event");
        self.latest.send_replace(Some(event.clone()));
        // No receivers is fine; `latest` still holds the event.
        let _ = self.events.send(event);
    }

    fn finish(self, event: TrackingEvent, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &event {
            TrackingEvent::Confirmed { .. } | TrackingEvent::Cancelled { .. } => {
                tracing::info!(tx_id = %self.id, outcome = event.label(), elapsed_ms, "Tracking finished");
            }
            _ => {
                tracing::warn!(tx_id = %self.id, outcome = event.label(), elapsed_ms, %event, "Tracking finished");
            }
        }
        metrics::record_tracking_outcome(event.label());

        self.latest.send_replace(Some(event.clone()));
        self.guard.release();
        let _ = self.events.send(event);
    }
}
