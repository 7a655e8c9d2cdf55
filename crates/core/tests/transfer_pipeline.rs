//! End-to-end transfer pipeline tests over in-memory store and ERP doubles.

mod support;

use std::sync::Arc;

use chrono::Duration;
use stockpost_core::{
    BatchClaimer, Clock, EntryOutcome, ErpTransferClient, ManualClock, ProcessError,
    RetryPolicy, RoundOutcome, TransferProcessor, TransferQueueStore,
};
use stockpost_domain::{DocumentKind, ErpError, QueueEntry, QueueStatus};
use support::{pending_entry, t0, InMemoryQueueStore, ScriptedErpClient};
use tokio_util::sync::CancellationToken;

struct Pipeline {
    clock: Arc<ManualClock>,
    store: Arc<InMemoryQueueStore>,
    erp: Arc<ScriptedErpClient>,
    claimer: BatchClaimer,
}

fn processor(
    store: &Arc<InMemoryQueueStore>,
    erp: &Arc<ScriptedErpClient>,
    clock: &Arc<ManualClock>,
) -> TransferProcessor {
    let store: Arc<dyn TransferQueueStore> = store.clone();
    let erp: Arc<dyn ErpTransferClient> = erp.clone();
    let clock: Arc<dyn Clock> = clock.clone();
    TransferProcessor::new(store, erp, RetryPolicy::default(), clock)
}

fn pipeline() -> Pipeline {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(InMemoryQueueStore::new(clock.clone()));
    let erp = Arc::new(ScriptedErpClient::new());
    let claimer = BatchClaimer::new(store.clone(), processor(&store, &erp, &clock), 5, clock.clone());
    Pipeline { clock, store, erp, claimer }
}

async fn run_round(pipeline: &Pipeline) -> RoundOutcome {
    pipeline
        .claimer
        .claim_and_process(&CancellationToken::new())
        .await
        .expect("round should succeed")
}

#[tokio::test]
async fn transfer_request_success_completes_entry() {
    let p = pipeline();
    let entry = pending_entry("WO-100", true, 3);
    p.store.seed([entry.clone()]).await;
    p.erp.push_success(100, "TR-1").await;

    let outcome = run_round(&p).await;

    let RoundOutcome::Processed(report) = outcome else {
        panic!("expected a processed round, got {outcome:?}");
    };
    assert_eq!(report.claimed, 1);
    assert_eq!(report.completed, 1);

    let stored = p.store.get(&entry.id).await;
    assert_eq!(stored.status, QueueStatus::Completed);
    assert_eq!(stored.result_doc_entry, Some(100));
    assert_eq!(stored.result_doc_num.as_deref(), Some("TR-1"));
    assert_eq!(stored.retry_count, 0);
    assert!(stored.last_error.is_none());
    assert!(stored.processing_started_at.is_none());
    stored.check_invariants().expect("completed entry should be consistent");

    let calls = p.erp.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation, DocumentKind::Request);
    assert_eq!(calls[0].document.reference, "WO-100");
    assert_eq!(calls[0].document.lines[0].from_warehouse_code, "01");
    assert_eq!(calls[0].document.lines[1].warehouse_code, "05");
}

#[tokio::test]
async fn direct_transfer_uses_direct_operation() {
    let p = pipeline();
    let entry = pending_entry("WO-101", false, 3);
    p.store.seed([entry.clone()]).await;
    p.erp.push_success(7, "ST-7").await;

    run_round(&p).await;

    let calls = p.erp.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation, DocumentKind::Direct);
    assert_eq!(p.store.get(&entry.id).await.status, QueueStatus::Completed);
}

#[tokio::test]
async fn three_failures_with_three_max_retries_require_review() {
    let p = pipeline();
    let entry = pending_entry("WO-200", true, 3);
    p.store.seed([entry.clone()]).await;
    for _ in 0..3 {
        p.erp.push_failure(ErpError::network("connection reset")).await;
    }

    run_round(&p).await;
    let stored = p.store.get(&entry.id).await;
    assert_eq!(stored.status, QueueStatus::Failed);
    assert_eq!(stored.retry_count, 1);
    assert_eq!(stored.next_retry_at, Some(t0() + Duration::seconds(20)));

    // Not eligible again until the backoff elapses.
    assert_eq!(run_round(&p).await, RoundOutcome::Idle);

    p.clock.advance(Duration::seconds(20));
    run_round(&p).await;
    let stored = p.store.get(&entry.id).await;
    assert_eq!(stored.status, QueueStatus::Failed);
    assert_eq!(stored.retry_count, 2);
    assert_eq!(stored.next_retry_at, Some(p.clock.now() + Duration::seconds(40)));

    p.clock.advance(Duration::seconds(40));
    run_round(&p).await;
    let stored = p.store.get(&entry.id).await;
    assert_eq!(stored.status, QueueStatus::RequiresReview);
    assert_eq!(stored.retry_count, 3);
    assert!(stored.next_retry_at.is_none());
    assert_eq!(stored.last_error.as_deref(), Some("Network Error: connection reset"));
    stored.check_invariants().expect("review entry should be consistent");

    assert_eq!(p.erp.calls().await.len(), 3);

    let review = p.store.list_by_status(QueueStatus::RequiresReview, 10).await.unwrap();
    assert_eq!(review.len(), 1);
    assert_eq!(review[0].id, entry.id);

    p.clock.advance(Duration::days(1));
    assert_eq!(run_round(&p).await, RoundOutcome::Idle);
}

#[tokio::test]
async fn malformed_payload_takes_the_retry_path() {
    let p = pipeline();
    let broken = QueueEntry::new("WO-300", "{not json", true, 3, t0());
    let failing = pending_entry("WO-301", true, 3);
    p.store.seed([broken.clone(), failing.clone()]).await;
    p.erp.push_failure(ErpError::business_rule("negative stock")).await;

    let outcome = run_round(&p).await;

    let RoundOutcome::Processed(report) = outcome else {
        panic!("malformed payload must not fail the round, got {outcome:?}");
    };
    assert_eq!(report.retry_scheduled, 2);

    let broken_stored = p.store.get(&broken.id).await;
    let failing_stored = p.store.get(&failing.id).await;
    assert_eq!(broken_stored.status, QueueStatus::Failed);
    assert_eq!(broken_stored.retry_count, 1);
    assert_eq!(broken_stored.next_retry_at, failing_stored.next_retry_at);
    assert!(broken_stored
        .last_error
        .as_deref()
        .is_some_and(|e| e.starts_with("malformed transfer payload")));

    // Only the well-formed entry reached the ERP.
    assert_eq!(p.erp.calls().await.len(), 1);
}

#[tokio::test]
async fn invalid_payload_is_a_processing_failure() {
    let p = pipeline();
    let payload = serde_json::json!({
        "fromWarehouse": "01",
        "toWarehouse": "02",
        "lines": []
    });
    let entry = QueueEntry::new("WO-302", payload.to_string(), false, 1, t0());
    p.store.seed([entry.clone()]).await;

    run_round(&p).await;

    let stored = p.store.get(&entry.id).await;
    assert_eq!(stored.status, QueueStatus::RequiresReview);
    assert_eq!(stored.retry_count, 1);
    assert!(p.erp.calls().await.is_empty());
}

#[tokio::test]
async fn long_error_text_is_truncated_before_persisting() {
    let p = pipeline();
    let entry = pending_entry("WO-400", false, 5);
    p.store.seed([entry.clone()]).await;
    p.erp.push_failure(ErpError::network("e".repeat(3000))).await;

    run_round(&p).await;

    let last_error = p.store.get(&entry.id).await.last_error.expect("error recorded");
    assert_eq!(last_error.chars().count(), 1900 + 3);
    assert!(last_error.ends_with("..."));
}

#[tokio::test]
async fn one_failing_entry_does_not_stop_the_batch() {
    let p = pipeline();
    let first = pending_entry("WO-500", false, 3);
    let mut second = pending_entry("WO-501", false, 3);
    let mut third = pending_entry("WO-502", true, 3);
    second.created_at = t0() + Duration::seconds(1);
    third.created_at = t0() + Duration::seconds(2);
    p.store.seed([third.clone(), first.clone(), second.clone()]).await;

    p.erp.push_success(1, "ST-1").await;
    p.erp.push_failure(ErpError::new(stockpost_domain::ErpErrorCategory::Server, "503")).await;
    p.erp.push_success(3, "TR-3").await;

    let outcome = run_round(&p).await;

    let RoundOutcome::Processed(report) = outcome else {
        panic!("expected a processed round, got {outcome:?}");
    };
    assert_eq!((report.completed, report.retry_scheduled), (2, 1));

    // Oldest first.
    let refs: Vec<String> =
        p.erp.calls().await.into_iter().map(|call| call.document.reference).collect();
    assert_eq!(refs, vec!["WO-500", "WO-501", "WO-502"]);

    assert_eq!(p.store.get(&first.id).await.status, QueueStatus::Completed);
    assert_eq!(p.store.get(&second.id).await.status, QueueStatus::Failed);
    assert_eq!(p.store.get(&third.id).await.status, QueueStatus::Completed);
}

#[tokio::test]
async fn each_transition_is_persisted_before_the_next_entry() {
    let p = pipeline();
    let first = pending_entry("WO-600", false, 3);
    let mut second = pending_entry("WO-601", false, 3);
    second.created_at = t0() + Duration::seconds(1);
    p.store.seed([first.clone(), second.clone()]).await;
    p.erp.push_success(1, "ST-1").await;
    p.erp.push_failure(ErpError::network("down")).await;

    run_round(&p).await;

    assert_eq!(
        p.store.writes().await,
        vec![
            format!("mark_processing:{}", first.id),
            format!("update_status:{}:completed", first.id),
            format!("mark_processing:{}", second.id),
            format!("update_status:{}:failed", second.id),
        ]
    );
}

#[tokio::test]
async fn processor_skips_entry_claimed_elsewhere() {
    let p = pipeline();
    let entry = pending_entry("WO-700", false, 3);
    p.store.seed([entry.clone()]).await;
    p.store.force_status(&entry.id, QueueStatus::Processing).await;

    let processor = processor(&p.store, &p.erp, &p.clock);
    let outcome = processor.process(&entry, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, EntryOutcome::Skipped);
    assert!(p.erp.calls().await.is_empty());
}

#[tokio::test]
async fn processor_skips_missing_entry() {
    let p = pipeline();
    let ghost = pending_entry("WO-701", false, 3);

    let processor = processor(&p.store, &p.erp, &p.clock);
    let outcome = processor.process(&ghost, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, EntryOutcome::Skipped);
}

#[tokio::test]
async fn zero_max_retries_goes_straight_to_review() {
    let p = pipeline();
    let entry = pending_entry("WO-800", true, 0);
    p.store.seed([entry.clone()]).await;
    p.erp.push_failure(ErpError::network("down")).await;

    let processor = processor(&p.store, &p.erp, &p.clock);
    let outcome = processor.process(&entry, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, EntryOutcome::RequiresReview { retry_count: 0 });
    p.store.get(&entry.id).await.check_invariants().expect("invariants hold");
}

#[tokio::test]
async fn cancellation_landing_on_the_claim_releases_the_entry() {
    let p = pipeline();
    let entry = pending_entry("WO-900", true, 3);
    p.store.seed([entry.clone()]).await;
    p.erp.push_success(900, "TR-9").await;

    let cancel = CancellationToken::new();
    p.store.cancel_on_next_claim(cancel.clone()).await;

    let processor = processor(&p.store, &p.erp, &p.clock);
    let result = processor.process(&entry, &cancel).await;

    assert!(matches!(result, Err(ProcessError::Cancelled)));
    assert!(p.erp.calls().await.is_empty());

    let stored = p.store.get(&entry.id).await;
    assert_eq!(stored.status, QueueStatus::Pending);
    assert_eq!(stored.retry_count, 0);
    assert!(stored.processing_started_at.is_none());
    assert_eq!(
        p.store.writes().await,
        [format!("mark_processing:{}", entry.id), format!("update_status:{}:pending", entry.id)]
    );
}
