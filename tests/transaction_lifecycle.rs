//! Sign → submit → track scenarios against a scripted node.

mod common;

use alloy::primitives::U256;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use common::{fast_tracker_config, included, not_present, scripted_client, ScriptedTransport};
use zil_client::config::TrackerConfig;
use zil_client::rpc::methods;
use zil_client::{
    Address, BlockchainError, TrackingEvent, TrackingOutcome, Transaction, TransactionTracker, TxId,
    TxParams, TxStatus, Wallet,
};

const TEST_PRIVATE_KEY: &str = "e19d05c5452598e24caad4a0d85a49146f7be089515c905ae6a19e8a578a6930";

fn signed_transfer(wallet: &Wallet) -> Transaction {
    let sender = wallet.add_key_hex(TEST_PRIVATE_KEY).unwrap();
    let mut tx = Transaction::new(TxParams {
        sender,
        to: Address::new([0x42; 20]),
        amount: U256::from(100u64),
        nonce: 5,
        gas_price: U256::from(2_000_000_000u64),
        gas_limit: 50,
        ..TxParams::default()
    });
    wallet.sign_transaction(&mut tx).unwrap();
    tx
}

async fn submitted(transport: &Arc<ScriptedTransport>) -> (Transaction, TransactionTracker) {
    transport.push(
        methods::CREATE_TRANSACTION,
        Ok(json!({"Info": "Non-contract txn, sent to shard", "TranID": "0xabc"})),
    );
    let client = scripted_client(transport.clone());
    let wallet = Wallet::new();
    let mut tx = signed_transfer(&wallet);

    let id = tx.submit(&client).await.unwrap();
    assert_eq!(id, TxId::from("0xabc"));
    assert_eq!(tx.status(), TxStatus::Pending);

    (tx, TransactionTracker::new(client, fast_tracker_config()).unwrap())
}

#[tokio::test]
async fn test_submit_then_confirm_on_first_poll() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(methods::GET_TRANSACTION, included(true));
    let (mut tx, tracker) = submitted(&transport).await;

    let mut subscription = tracker.track(tx.id().unwrap());
    let event = subscription.next_event().await.unwrap();
    match &event {
        TrackingEvent::Confirmed { receipt, .. } => {
            assert!(receipt.success);
            assert_eq!(receipt.epoch_num, Some(1021));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(subscription.next_event().await.is_none());

    let receipt = tracker.confirm(&mut tx).await.unwrap();
    assert_eq!(tx.status(), TxStatus::Confirmed);
    assert_eq!(tx.receipt(), Some(&receipt));
}

#[tokio::test]
async fn test_confirm_after_pending_polls() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .push(methods::GET_TRANSACTION, not_present())
        .push(methods::GET_TRANSACTION, not_present())
        .push(methods::GET_TRANSACTION, included(true));
    let (mut tx, tracker) = submitted(&transport).await;

    let receipt = tracker.confirm(&mut tx).await.unwrap();
    assert!(receipt.success);
    assert_eq!(tx.status(), TxStatus::Confirmed);
    assert_eq!(transport.calls(methods::GET_TRANSACTION), 3);
    assert_eq!(tracker.active_count(), 0);
}

#[tokio::test]
async fn test_pending_then_final_event_order() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .push(methods::GET_TRANSACTION, not_present())
        .push(methods::GET_TRANSACTION, not_present())
        .push(methods::GET_TRANSACTION, included(true));
    let (tx, tracker) = submitted(&transport).await;

    let mut subscription = tracker.track(tx.id().unwrap());
    let mut labels = Vec::new();
    while let Some(event) = subscription.next_event().await {
        labels.push(event.label());
    }
    assert_eq!(labels, vec!["pending", "confirmed"]);
}

#[tokio::test]
async fn test_unreachable_node_leaves_transaction_pending() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(
        methods::GET_TRANSACTION,
        Err(BlockchainError::Transport("connection refused".into())),
    );
    let (mut tx, _) = submitted(&transport).await;

    let mut config = fast_tracker_config();
    config.max_attempts = Some(3);
    let tracker = TransactionTracker::new(scripted_client(transport.clone()), config).unwrap();

    let err = tracker.confirm(&mut tx).await.unwrap_err();
    assert!(matches!(err, BlockchainError::TrackingFailed(_)));
    assert_eq!(tx.status(), TxStatus::Pending);
    assert!(tx.rejection_reason().is_none());
    assert_eq!(transport.calls(methods::GET_TRANSACTION), 3);
}

#[tokio::test]
async fn test_consecutive_transport_failures_give_up() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(methods::GET_TRANSACTION, Err(BlockchainError::Timeout(10)));
    let (tx, _) = submitted(&transport).await;

    let mut config = fast_tracker_config();
    config.max_attempts = None;
    config.max_transport_retries = 2;
    let tracker = TransactionTracker::new(scripted_client(transport.clone()), config).unwrap();

    match tracker.track(tx.id().unwrap()).wait().await {
        TrackingOutcome::TrackingFailed { attempts, reason } => {
            assert_eq!(attempts, 3);
            assert!(reason.contains("3 consecutive failures"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_transport_failure_then_recovery() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .push(methods::GET_TRANSACTION, Err(BlockchainError::Transport("reset".into())))
        .push(methods::GET_TRANSACTION, Err(BlockchainError::Decode("garbage".into())))
        .push(methods::GET_TRANSACTION, included(true));
    let (mut tx, tracker) = submitted(&transport).await;

    tracker.confirm(&mut tx).await.unwrap();
    assert_eq!(tx.status(), TxStatus::Confirmed);
}

#[tokio::test]
async fn test_failed_receipt_rejects_without_further_polls() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(methods::GET_TRANSACTION, included(false));
    let (mut tx, tracker) = submitted(&transport).await;

    let err = tracker.confirm(&mut tx).await.unwrap_err();
    assert_eq!(
        err,
        BlockchainError::Rejected {
            reason: "Insufficient balance".into()
        }
    );
    assert_eq!(tx.status(), TxStatus::Rejected);
    assert_eq!(tx.rejection_reason(), Some("Insufficient balance"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.calls(methods::GET_TRANSACTION), 1);
    assert_eq!(tracker.active_count(), 0);
}

#[tokio::test]
async fn test_node_error_rejects() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(
        methods::GET_TRANSACTION,
        Err(BlockchainError::Rpc {
            code: -8,
            message: "Invalid transaction hash".into(),
        }),
    );
    let (mut tx, tracker) = submitted(&transport).await;

    assert!(matches!(
        tracker.confirm(&mut tx).await,
        Err(BlockchainError::Rejected { .. })
    ));
    assert_eq!(tx.status(), TxStatus::Rejected);
}

#[tokio::test]
async fn test_never_found_times_out() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(methods::GET_TRANSACTION, not_present());
    let (mut tx, _) = submitted(&transport).await;

    let mut config = fast_tracker_config();
    config.max_attempts = Some(4);
    let tracker = TransactionTracker::new(scripted_client(transport.clone()), config).unwrap();

    assert_eq!(
        tracker.track(tx.id().unwrap()).wait().await,
        TrackingOutcome::TimedOut { attempts: 4 }
    );

    assert!(matches!(
        tracker.confirm(&mut tx).await,
        Err(BlockchainError::TrackingFailed(_))
    ));
    assert_eq!(tx.status(), TxStatus::Pending);
}

#[tokio::test]
async fn test_wall_clock_budget() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(methods::GET_TRANSACTION, not_present());
    let (tx, _) = submitted(&transport).await;

    let mut config = fast_tracker_config();
    config.max_attempts = None;
    config.timeout_ms = Some(60);
    let tracker = TransactionTracker::new(scripted_client(transport.clone()), config).unwrap();

    let started = std::time::Instant::now();
    let outcome = tracker.track(tx.id().unwrap()).wait().await;
    assert!(matches!(outcome, TrackingOutcome::TimedOut { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_concurrent_tracks_share_one_poll_stream() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(20)));
    transport
        .push(methods::GET_TRANSACTION, not_present())
        .push(methods::GET_TRANSACTION, included(true));
    let (tx, tracker) = submitted(&transport).await;
    let id = tx.id().unwrap().clone();

    let first = tracker.track(&id);
    let second = tracker.track(&TxId::from("0xABC"));
    assert_eq!(tracker.active_count(), 1);

    let (a, b) = tokio::join!(first.wait(), second.wait());
    assert!(matches!(a, TrackingOutcome::Confirmed(_)));
    assert_eq!(a, b);
    assert_eq!(transport.calls(methods::GET_TRANSACTION), 2);
    assert_eq!(tracker.active_count(), 0);
}

#[tokio::test]
async fn test_cancel_stops_polling_and_keeps_status() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(methods::GET_TRANSACTION, not_present());
    let (mut tx, tracker) = submitted(&transport).await;

    let watcher = tracker.clone();
    let id = tx.id().unwrap().clone();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(watcher.cancel(&id));
    });

    let err = tracker.confirm(&mut tx).await.unwrap_err();
    canceller.await.unwrap();
    assert_eq!(err, BlockchainError::Cancelled);
    assert_eq!(tx.status(), TxStatus::Pending);
    assert_eq!(tracker.active_count(), 0);

    let polls = transport.calls(methods::GET_TRANSACTION);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.calls(methods::GET_TRANSACTION), polls);
}

#[tokio::test]
async fn test_subscription_cancel_and_shutdown() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(methods::GET_TRANSACTION, not_present());
    let tracker = TransactionTracker::new(scripted_client(transport.clone()), fast_tracker_config()).unwrap();

    let first = tracker.track(&TxId::from("aa"));
    let second = tracker.track(&TxId::from("bb"));
    assert_eq!(tracker.active_count(), 2);

    first.cancel();
    assert_eq!(first.wait().await, TrackingOutcome::Cancelled);

    tracker.shutdown();
    assert_eq!(second.wait().await, TrackingOutcome::Cancelled);
    assert_eq!(tracker.active_count(), 0);
    assert!(!tracker.cancel(&TxId::from("aa")));
}

#[tokio::test]
async fn test_confirm_requires_submission() {
    let transport = Arc::new(ScriptedTransport::new());
    let tracker = TransactionTracker::new(scripted_client(transport.clone()), fast_tracker_config()).unwrap();
    let wallet = Wallet::new();
    let mut tx = signed_transfer(&wallet);

    assert_eq!(tracker.confirm(&mut tx).await.unwrap_err(), BlockchainError::NotSubmitted);
    assert_eq!(transport.calls(methods::GET_TRANSACTION), 0);
}

#[tokio::test]
async fn test_pending_cannot_return_to_initialized() {
    let transport = Arc::new(ScriptedTransport::new());
    let (mut tx, _) = submitted(&transport).await;
    let client = scripted_client(transport.clone());

    assert!(tx.set_amount(U256::from(1u64)).is_err());
    assert!(tx.submit(&client).await.is_err());
    let pk = *tx.public_key().unwrap();
    let sig = *tx.signature().unwrap();
    assert!(tx.attach_signature(pk, sig).is_err());
    assert_eq!(tx.status(), TxStatus::Pending);
}

#[tokio::test]
async fn test_retrack_after_finish_starts_new_session() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(methods::GET_TRANSACTION, included(true));
    let tracker = TransactionTracker::new(scripted_client(transport.clone()), fast_tracker_config()).unwrap();
    let id = TxId::from("abc");

    assert!(matches!(tracker.track(&id).wait().await, TrackingOutcome::Confirmed(_)));
    assert!(matches!(tracker.track(&id).wait().await, TrackingOutcome::Confirmed(_)));
    assert_eq!(transport.calls(methods::GET_TRANSACTION), 2);
}

#[tokio::test]
async fn test_node_server_error_is_retried() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .push(
            methods::GET_TRANSACTION,
            Err(BlockchainError::Rpc {
                code: -32603,
                message: "Internal error".into(),
            }),
        )
        .push(methods::GET_TRANSACTION, included(true));
    let (mut tx, tracker) = submitted(&transport).await;

    let receipt = tracker.confirm(&mut tx).await.unwrap();
    assert!(receipt.success);
    assert_eq!(tx.status(), TxStatus::Confirmed);
    assert_eq!(transport.calls(methods::GET_TRANSACTION), 2);
}

#[tokio::test]
async fn test_persistent_server_errors_never_reject() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(
        methods::GET_TRANSACTION,
        Err(BlockchainError::Rpc {
            code: -32000,
            message: "Server busy".into(),
        }),
    );
    let (mut tx, _) = submitted(&transport).await;

    let mut config = fast_tracker_config();
    config.max_attempts = None;
    config.max_transport_retries = 2;
    let tracker = TransactionTracker::new(scripted_client(transport.clone()), config).unwrap();

    let err = tracker.confirm(&mut tx).await.unwrap_err();
    assert!(matches!(err, BlockchainError::TrackingFailed(_)));
    assert_eq!(tx.status(), TxStatus::Pending);
    assert!(tx.rejection_reason().is_none());
}

#[tokio::test]
async fn test_stalled_node_bounded_by_timeout() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_secs(30)));
    transport.push(methods::GET_TRANSACTION, not_present());

    let mut config = fast_tracker_config();
    config.max_attempts = None;
    config.timeout_ms = Some(100);
    let tracker = TransactionTracker::new(scripted_client(transport.clone()), config).unwrap();

    let started = std::time::Instant::now();
    let outcome = tracker.track(&TxId::from("abc")).wait().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    match outcome {
        TrackingOutcome::TrackingFailed { attempts, reason } => {
            assert_eq!(attempts, 1);
            assert!(reason.contains("deadline"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!tracker.is_tracking(&TxId::from("abc")));
    assert_eq!(tracker.active_count(), 0);
}

#[tokio::test]
async fn test_unbounded_session_config_rejected() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(methods::GET_TRANSACTION, not_present());
    let tracker = TransactionTracker::new(scripted_client(transport.clone()), fast_tracker_config()).unwrap();
    let id = TxId::from("abc");

    let unbounded = TrackerConfig {
        max_attempts: None,
        timeout_ms: None,
        ..fast_tracker_config()
    };
    let busy = TrackerConfig {
        poll_interval_ms: 0,
        ..fast_tracker_config()
    };

    assert!(matches!(
        tracker.track_with(&id, unbounded.clone()),
        Err(BlockchainError::Config(_))
    ));
    assert!(matches!(tracker.track_with(&id, busy), Err(BlockchainError::Config(_))));
    assert!(TransactionTracker::new(scripted_client(transport.clone()), unbounded).is_err());

    assert_eq!(tracker.active_count(), 0);
    assert_eq!(transport.calls(methods::GET_TRANSACTION), 0);
}

#[tokio::test]
async fn test_session_config_applies_to_new_session() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(methods::GET_TRANSACTION, not_present());
    let tracker = TransactionTracker::new(scripted_client(transport.clone()), fast_tracker_config()).unwrap();

    let config = TrackerConfig {
        max_attempts: Some(2),
        ..fast_tracker_config()
    };
    let subscription = tracker.track_with(&TxId::from("abc"), config).unwrap();
    assert_eq!(subscription.wait().await, TrackingOutcome::TimedOut { attempts: 2 });
}

#[tokio::test]
async fn test_batch_with_one_refused_transaction() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(
        methods::GET_BALANCE,
        Ok(json!({"balance": "5000000000000", "nonce": 7})),
    );
    transport
        .push(
            methods::CREATE_TRANSACTION,
            Ok(json!({"Info": "Non-contract txn, sent to shard", "TranID": "aa"})),
        )
        .push(
            methods::CREATE_TRANSACTION,
            Err(BlockchainError::Rpc {
                code: -26,
                message: "Nonce is lower than expected".into(),
            }),
        )
        .push(
            methods::CREATE_TRANSACTION,
            Ok(json!({"Info": "Non-contract txn, sent to shard", "TranID": "cc"})),
        );
    transport.push(methods::GET_TRANSACTION, included(true));

    let client = scripted_client(transport.clone());
    let wallet = Wallet::new();
    let template = signed_transfer(&wallet);
    let mut txs = vec![Transaction::new(template.params().clone()); 3];

    wallet.sign_batch(&client, &mut txs).await.unwrap();
    let nonces: Vec<u64> = txs.iter().map(Transaction::nonce).collect();
    assert_eq!(nonces, vec![8, 9, 10]);
    assert!(txs.iter().all(|tx| tx.verify_signature().unwrap()));
    assert_eq!(transport.calls(methods::GET_BALANCE), 1);

    let submitted = Transaction::submit_batch(&mut txs, &client).await.unwrap();
    assert_eq!(submitted[0], Ok(TxId::from("aa")));
    assert!(matches!(submitted[1], Err(BlockchainError::Rpc { code: -26, .. })));
    assert_eq!(submitted[2], Ok(TxId::from("cc")));
    let statuses: Vec<TxStatus> = txs.iter().map(Transaction::status).collect();
    assert_eq!(
        statuses,
        vec![TxStatus::Pending, TxStatus::Initialized, TxStatus::Pending]
    );

    let tracker = TransactionTracker::new(client, fast_tracker_config()).unwrap();
    let receipts = tracker.confirm_batch(&mut txs).await;
    assert!(receipts[0].is_ok());
    assert_eq!(receipts[1], Err(BlockchainError::NotSubmitted));
    assert!(receipts[2].is_ok());
    let statuses: Vec<TxStatus> = txs.iter().map(Transaction::status).collect();
    assert_eq!(
        statuses,
        vec![TxStatus::Confirmed, TxStatus::Initialized, TxStatus::Confirmed]
    );
    assert_eq!(tracker.active_count(), 0);
}

#[tokio::test]
async fn test_sign_batch_with_unknown_sender_changes_nothing() {
    let transport = Arc::new(ScriptedTransport::new());
    let client = scripted_client(transport.clone());
    let wallet = Wallet::new();
    let known = signed_transfer(&wallet);
    let stranger = Transaction::new(TxParams {
        sender: Address::new([0x99; 20]),
        ..known.params().clone()
    });
    let mut txs = vec![known.clone(), stranger];

    assert_eq!(
        wallet.sign_batch(&client, &mut txs).await.unwrap_err(),
        BlockchainError::UnknownAddress(Address::new([0x99; 20]))
    );
    assert_eq!(txs[0], known);
    assert!(!txs[1].is_signed());
    assert_eq!(transport.calls(methods::GET_BALANCE), 0);
}
