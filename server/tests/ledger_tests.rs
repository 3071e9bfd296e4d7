mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use superchat_common::amount::MIST_PER_SUI;
use superchat_common::error::LedgerError;
use superchat_common::reconcile::PassStatus;
use superchat_common::streamer::StreamerProfile;
use superchat_server::ledger::{Ledger, LedgerSettings};
use superchat_server::persistence::SnapshotFile;
use superchat_server::poller;
use support::*;

fn raw(submitted: &superchat_server::ledger::SubmittedMessage) -> i128 {
    submitted.exact_amount.to_raw_units(MIST_PER_SUI) as i128
}

#[tokio::test]
async fn test_rejected_submissions_create_no_record() {
    let ledger = in_memory_ledger();

    for amount in [0.0, -1.0, f64::NAN, 0.00001] {
        let err = ledger
            .submit_message("viewer", "hello", amount, STREAMER)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)), "{amount}: {err:?}");
    }
    assert!(matches!(
        ledger.submit_message("", "hello", 1.0, STREAMER).await,
        Err(LedgerError::InvalidInput(_))
    ));
    assert!(matches!(
        ledger.submit_message("viewer", "hello", 1.0, "not-an-address").await,
        Err(LedgerError::InvalidInput(_))
    ));

    let stats = ledger.stats().await;
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.confirmed, 0);
}

#[tokio::test]
async fn test_submit_then_pay_confirms_once() {
    let ledger = in_memory_ledger();
    let submitted = ledger
        .submit_message("alice", "great stream", 1.47, STREAMER)
        .await
        .unwrap();

    let exact = submitted.exact_amount;
    assert_eq!(exact.whole(), 1);
    assert!((1000..=9999).contains(&exact.fraction()));
    assert_eq!(ledger.pending_messages(STREAMER).await.unwrap().len(), 1);

    let source = StaticSource::new(vec![sui_transfer(raw(&submitted), STREAMER, "Digest1")]);
    let report = ledger.trigger_reconciliation(&source, STREAMER).await.unwrap();
    assert_eq!(report.status, PassStatus::Completed);
    assert_eq!(report.newly_confirmed, vec![submitted.id]);

    let confirmed = ledger.confirmed_messages(STREAMER).await.unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].display_name, "alice");
    assert_eq!(confirmed[0].transfer_ref.as_deref(), Some("Digest1"));
    assert!(ledger.pending_messages(STREAMER).await.unwrap().is_empty());

    let again = ledger.trigger_reconciliation(&source, STREAMER).await.unwrap();
    assert_eq!(again.status, PassStatus::Completed);
    assert!(again.newly_confirmed.is_empty());
}

#[tokio::test]
async fn test_base_just_below_whole_keeps_its_whole_part() {
    let ledger = in_memory_ledger();
    let submitted = ledger.submit_message("v", "m", 0.99999, STREAMER).await.unwrap();
    assert_eq!(submitted.exact_amount.whole(), 0);
    assert!((1000..=9999).contains(&submitted.exact_amount.fraction()));

    let submitted = ledger.submit_message("v", "m", 2.99999, STREAMER).await.unwrap();
    assert_eq!(submitted.exact_amount.whole(), 2);
}

#[tokio::test]
async fn test_confirmed_amount_is_never_matched_again() {
    let ledger = in_memory_ledger();
    let submitted = ledger.submit_message("bob", "hi", 2.0, STREAMER).await.unwrap();
    let source = StaticSource::new(vec![sui_transfer(raw(&submitted), STREAMER, "First")]);
    ledger.trigger_reconciliation(&source, STREAMER).await.unwrap();

    source.push(sui_transfer(raw(&submitted), STREAMER, "Second"));
    let report = ledger.trigger_reconciliation(&source, STREAMER).await.unwrap();
    assert!(report.newly_confirmed.is_empty());

    let message = ledger.message(&submitted.id).await.unwrap();
    assert_eq!(message.transfer_ref.as_deref(), Some("First"));
    assert_eq!(ledger.stats().await.confirmed, 1);
}

#[tokio::test]
async fn test_transfer_to_other_streamer_does_not_confirm() {
    let ledger = in_memory_ledger();
    let submitted = ledger.submit_message("carol", "yo", 3.0, STREAMER).await.unwrap();
    let source = StaticSource::new(vec![sui_transfer(raw(&submitted), OTHER_STREAMER, "D")]);

    let report = ledger
        .trigger_reconciliation(&source, OTHER_STREAMER)
        .await
        .unwrap();
    assert!(report.newly_confirmed.is_empty());
    assert!(ledger.message(&submitted.id).await.unwrap().is_pending());
}

#[tokio::test]
async fn test_upstream_failure_leaves_store_untouched() {
    let ledger = in_memory_ledger();
    let submitted = ledger.submit_message("dave", "hey", 1.0, STREAMER).await.unwrap();

    let report = ledger
        .trigger_reconciliation(&FailingSource, STREAMER)
        .await
        .unwrap();
    assert!(matches!(report.status, PassStatus::UpstreamUnavailable { .. }));
    assert!(report.newly_confirmed.is_empty());
    assert!(report.failure().unwrap().is_retryable());
    assert!(ledger.message(&submitted.id).await.unwrap().is_pending());
}

#[tokio::test]
async fn test_slow_fetch_times_out() {
    let ledger = Ledger::new(LedgerSettings {
        fetch_timeout: Duration::from_millis(50),
        ..LedgerSettings::default()
    });
    let report = ledger
        .trigger_reconciliation(&SlowSource(Duration::from_secs(10)), STREAMER)
        .await
        .unwrap();
    match report.status {
        PassStatus::UpstreamUnavailable { reason } => assert!(reason.contains("timed out")),
        other => panic!("expected upstream failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_overlapping_pass_is_skipped() {
    let ledger = Arc::new(in_memory_ledger());
    let gate = Arc::new(GateSource::default());

    let first = {
        let ledger = ledger.clone();
        let gate = gate.clone();
        tokio::spawn(async move { ledger.trigger_reconciliation(gate.as_ref(), STREAMER).await })
    };
    gate.entered.notified().await;

    let second = ledger
        .trigger_reconciliation(&StaticSource::default(), STREAMER)
        .await
        .unwrap();
    assert_eq!(second.status, PassStatus::Skipped);

    // Submissions are not blocked by a pass waiting on the source.
    ledger.submit_message("erin", "still here", 1.0, STREAMER).await.unwrap();

    gate.release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status, PassStatus::Completed);
}

#[tokio::test]
async fn test_concurrent_submissions_get_distinct_amounts() {
    let ledger = Arc::new(in_memory_ledger());
    let mut handles = Vec::new();
    for i in 0..200 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .submit_message(&format!("viewer{i}"), "hi", 5.0, STREAMER)
                .await
                .unwrap()
        }));
    }

    let mut keys = HashSet::new();
    for handle in handles {
        let submitted = handle.await.unwrap();
        assert!(keys.insert(submitted.exact_amount.key()));
    }
    assert_eq!(keys.len(), 200);
    assert_eq!(ledger.stats().await.pending, 200);
}

#[tokio::test]
async fn test_exhausted_base_fails_without_record() {
    let ledger = in_memory_ledger();
    let mut stored = 0;
    let mut exhausted = false;
    // 9000 suffixes exist per whole base; the 9001st submission must fail.
    for _ in 0..=9000 {
        match ledger.submit_message("v", "m", 0.5, STREAMER).await {
            Ok(_) => stored += 1,
            Err(LedgerError::GenerationExhausted { attempts, .. }) => {
                assert_eq!(attempts, 64);
                exhausted = true;
                break;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(exhausted);
    assert_eq!(ledger.stats().await.pending, stored);
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    let settings = || LedgerSettings {
        snapshot_file: Some(SnapshotFile::new(&path)),
        ..LedgerSettings::default()
    };

    let (paid, unpaid) = {
        let ledger = Ledger::open(settings()).unwrap();
        ledger
            .register_streamer(StreamerProfile::new(STREAMER, None, Utc::now()).unwrap())
            .await;
        let paid = ledger.submit_message("a", "paid", 1.0, STREAMER).await.unwrap();
        let unpaid = ledger.submit_message("b", "unpaid", 1.0, STREAMER).await.unwrap();
        let source = StaticSource::new(vec![sui_transfer(raw(&paid), STREAMER, "D1")]);
        ledger.trigger_reconciliation(&source, STREAMER).await.unwrap();
        (paid, unpaid)
    };

    let ledger = Ledger::open(settings()).unwrap();
    assert!(ledger.message(&paid.id).await.unwrap().confirmed);
    assert!(ledger.message(&unpaid.id).await.unwrap().is_pending());
    assert_eq!(ledger.watched_addresses().await, vec![STREAMER.to_string()]);

    // The restored transfer index still blocks reuse of the digest.
    let source = StaticSource::new(vec![sui_transfer(raw(&unpaid), STREAMER, "D1")]);
    let report = ledger.trigger_reconciliation(&source, STREAMER).await.unwrap();
    assert!(report.newly_confirmed.is_empty());
}

#[tokio::test]
async fn test_poll_once_covers_registered_streamers() {
    let ledger = in_memory_ledger();
    ledger
        .register_streamer(StreamerProfile::new(STREAMER, None, Utc::now()).unwrap())
        .await;
    let submitted = ledger.submit_message("f", "poll me", 1.0, STREAMER).await.unwrap();
    let source = StaticSource::new(vec![sui_transfer(raw(&submitted), STREAMER, "P1")]);

    let reports = poller::poll_once(&ledger, &source).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, STREAMER);
    assert_eq!(reports[0].1.newly_confirmed, vec![submitted.id]);
}

#[tokio::test]
async fn test_spawned_poller_confirms_and_shuts_down() {
    let ledger = Arc::new(in_memory_ledger());
    ledger
        .register_streamer(StreamerProfile::new(STREAMER, None, Utc::now()).unwrap())
        .await;
    let submitted = ledger.submit_message("g", "tick", 1.0, STREAMER).await.unwrap();
    let source = Arc::new(StaticSource::new(vec![sui_transfer(raw(&submitted), STREAMER, "T1")]));

    let handle = poller::spawn(ledger.clone(), source, Duration::from_millis(20));
    for _ in 0..100 {
        if ledger.stats().await.confirmed == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.shutdown().await;
    assert!(ledger.message(&submitted.id).await.unwrap().confirmed);
}
