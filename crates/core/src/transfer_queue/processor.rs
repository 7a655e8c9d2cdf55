//! Per-entry processing state machine
//!
//! One call to [`TransferProcessor::process`] is one attempt at posting one
//! queue entry:
//!
//! 1. claim the entry (`pending|failed` → `processing`) before any ERP call
//! 2. parse the payload and build the ERP document
//! 3. invoke exactly one ERP operation, chosen by [`DocumentKind`]
//! 4. persist `completed`, or hand the failure to [`RetryPolicy`]
//!
//! Payload and ERP failures never escape: they become a retry-scheduled or
//! requires-review transition. Only cancellation and store failures are
//! reported to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use stockpost_domain::constants::DEFAULT_ERP_CALL_TIMEOUT_SECS;
use stockpost_domain::{
    DocumentKind, ErpError, ErpTransferDocument, PostedDocument, QueueEntry, QueueStatus,
    StatusUpdate, StockpostError, TransferPayload,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::documents::build_document;
use super::ports::{ErpTransferClient, TransferQueueStore};
use super::retry_policy::RetryPolicy;
use crate::utils::clock::Clock;

/// Result of one processing attempt that reached a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Posted; the entry is now `completed`.
    Completed(PostedDocument),
    /// Failed with attempts left; the entry is `failed` until `next_retry_at`.
    RetryScheduled { retry_count: u32, next_retry_at: DateTime<Utc> },
    /// Failed for the last allowed time; the entry awaits manual review.
    RequiresReview { retry_count: u32 },
    /// Another caller claimed the entry first, or it disappeared.
    Skipped,
}

/// Reasons an attempt could not reach a decision.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("processing cancelled")]
    Cancelled,

    #[error("queue store {operation} failed for entry {entry_id}: {source}")]
    Store {
        entry_id: String,
        operation: &'static str,
        #[source]
        source: StockpostError,
    },
}

/// Drives a single queue entry through one attempt.
pub struct TransferProcessor {
    store: Arc<dyn TransferQueueStore>,
    erp: Arc<dyn ErpTransferClient>,
    retry_policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    erp_call_timeout: Option<Duration>,
}

impl TransferProcessor {
    pub fn new(
        store: Arc<dyn TransferQueueStore>,
        erp: Arc<dyn ErpTransferClient>,
        retry_policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            erp,
            retry_policy,
            clock,
            erp_call_timeout: Some(Duration::from_secs(DEFAULT_ERP_CALL_TIMEOUT_SECS)),
        }
    }

    /// Bound each ERP call; `None` waits for the client indefinitely.
    pub fn with_erp_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.erp_call_timeout = timeout;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Run one attempt for `entry`.
    ///
    /// If cancellation fires while the ERP call is in flight the entry is
    /// left in `processing`; the stale sweep returns it to the queue.
    pub async fn process(
        &self,
        entry: &QueueEntry,
        cancel: &CancellationToken,
    ) -> Result<EntryOutcome, ProcessError> {
        let attempt = entry.retry_count.saturating_add(1);

        if let Err(err) = self.store.mark_processing(&entry.id, cancel).await {
            return match err {
                StockpostError::Cancelled => Err(ProcessError::Cancelled),
                StockpostError::NotFound(_) | StockpostError::Conflict(_) => {
                    warn!(
                        entry_id = %entry.id,
                        external_reference = %entry.external_reference,
                        error = %err,
                        "Entry no longer claimable; skipping"
                    );
                    Ok(EntryOutcome::Skipped)
                }
                source => Err(ProcessError::Store {
                    entry_id: entry.id.clone(),
                    operation: "mark_processing",
                    source,
                }),
            };
        }

        debug!(
            entry_id = %entry.id,
            external_reference = %entry.external_reference,
            attempt,
            kind = %entry.document_kind(),
            "Claimed transfer entry"
        );

        // The claim may have committed after shutdown began; give it back
        // untouched rather than leave it in `processing`.
        if cancel.is_cancelled() {
            self.persist(entry, &StatusUpdate::released(entry), &CancellationToken::new())
                .await?;
            info!(
                entry_id = %entry.id,
                external_reference = %entry.external_reference,
                status = %entry.status,
                "Cancelled before ERP call; claim released"
            );
            return Err(ProcessError::Cancelled);
        }

        let started = Instant::now();
        let result = match self.attempt(entry, cancel).await {
            Some(result) => result,
            None => {
                warn!(
                    entry_id = %entry.id,
                    external_reference = %entry.external_reference,
                    attempt,
                    duration_ms = elapsed_ms(started),
                    "Cancelled during ERP call; entry left in processing"
                );
                return Err(ProcessError::Cancelled);
            }
        };
        let duration_ms = elapsed_ms(started);

        // The ERP side effect (or its failure) already happened, so the
        // outcome is recorded even when shutdown has begun.
        let persist_token = CancellationToken::new();

        match result {
            Ok(posted) => {
                let update = StatusUpdate::completed(entry.retry_count, &posted);
                self.persist(entry, &update, &persist_token).await?;
                info!(
                    entry_id = %entry.id,
                    external_reference = %entry.external_reference,
                    attempt,
                    duration_ms,
                    doc_entry = posted.doc_entry,
                    doc_num = %posted.doc_num,
                    event = "transfer_completed",
                    "Transfer posted to ERP"
                );
                Ok(EntryOutcome::Completed(posted))
            }
            Err(failure) => {
                let (decision, update) =
                    self.retry_policy.failure_update(entry, &failure, self.clock.now());
                self.persist(entry, &update, &persist_token).await?;

                match (decision.status, update.next_retry_at) {
                    (QueueStatus::Failed, Some(next_retry_at)) => {
                        warn!(
                            entry_id = %entry.id,
                            external_reference = %entry.external_reference,
                            attempt,
                            duration_ms,
                            retry_count = decision.retry_count,
                            max_retries = entry.max_retries,
                            next_retry_at = %next_retry_at,
                            error = %failure,
                            event = "transfer_retry_scheduled",
                            "Transfer attempt failed; retry scheduled"
                        );
                        Ok(EntryOutcome::RetryScheduled {
                            retry_count: decision.retry_count,
                            next_retry_at,
                        })
                    }
                    _ => {
                        error!(
                            entry_id = %entry.id,
                            external_reference = %entry.external_reference,
                            attempt,
                            duration_ms,
                            retry_count = decision.retry_count,
                            max_retries = entry.max_retries,
                            error = %failure,
                            event = "transfer_requires_review",
                            "Transfer retries exhausted; entry requires review"
                        );
                        Ok(EntryOutcome::RequiresReview { retry_count: decision.retry_count })
                    }
                }
            }
        }
    }

    /// Parse, build and post. `None` means cancellation won the race.
    async fn attempt(
        &self,
        entry: &QueueEntry,
        cancel: &CancellationToken,
    ) -> Option<Result<PostedDocument, String>> {
        let payload = match TransferPayload::from_json(&entry.payload_json) {
            Ok(payload) => payload,
            Err(err) => return Some(Err(err.to_string())),
        };
        let document = build_document(entry.document_kind(), &entry.external_reference, &payload);

        let result = self.post(&document, cancel).await?;
        Some(result.map_err(|err| {
            debug!(
                entry_id = %entry.id,
                error_category = %err.category,
                transient = err.category.is_transient(),
                "ERP rejected transfer"
            );
            err.to_string()
        }))
    }

    async fn post(
        &self,
        document: &ErpTransferDocument,
        cancel: &CancellationToken,
    ) -> Option<Result<PostedDocument, ErpError>> {
        let call = async {
            match document.kind {
                DocumentKind::Request => self.erp.post_transfer_request(document, cancel).await,
                DocumentKind::Direct => self.erp.post_direct_transfer(document, cancel).await,
            }
        };

        let bounded = async {
            match self.erp_call_timeout {
                Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                    Err(ErpError::timeout(format!(
                        "ERP call did not complete within {}s",
                        limit.as_secs()
                    )))
                }),
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = bounded => Some(result),
        }
    }

    async fn persist(
        &self,
        entry: &QueueEntry,
        update: &StatusUpdate,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        self.store.update_status(&entry.id, update, cancel).await.map_err(|source| {
            error!(
                entry_id = %entry.id,
                external_reference = %entry.external_reference,
                status = %update.status,
                error = %source,
                "Failed to persist entry transition"
            );
            ProcessError::Store { entry_id: entry.id.clone(), operation: "update_status", source }
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
