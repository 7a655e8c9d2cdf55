//! Batch claiming behind a single-admission gate
//!
//! A round claims up to `batch_size` eligible entries and processes them one
//! at a time, in the order the store returned them. Rounds never overlap: a
//! caller that finds the gate held skips instead of waiting.

use std::sync::Arc;
use std::time::Duration;

use stockpost_domain::StockpostError;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ports::TransferQueueStore;
use super::processor::{EntryOutcome, ProcessError, TransferProcessor};
use crate::utils::clock::Clock;

/// Per-round tally of entry outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub claimed: usize,
    pub completed: usize,
    pub retry_scheduled: usize,
    pub requires_review: usize,
    /// Lost the claim race to another caller
    pub skipped: usize,
    /// Left untouched because cancellation fired mid-batch
    pub cancelled: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &EntryOutcome) {
        match outcome {
            EntryOutcome::Completed(_) => self.completed += 1,
            EntryOutcome::RetryScheduled { .. } => self.retry_scheduled += 1,
            EntryOutcome::RequiresReview { .. } => self.requires_review += 1,
            EntryOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// How an admitted (or refused) round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Another round held the gate.
    Skipped,
    /// Nothing was eligible.
    Idle,
    Processed(BatchReport),
}

/// Round-level failures. Entry-level failures never surface here.
#[derive(Debug, Error)]
pub enum RoundError {
    #[error("failed to claim batch: {0}")]
    Claim(#[source] StockpostError),

    #[error("failed to requeue stale processing entries: {0}")]
    Sweep(#[source] StockpostError),

    #[error("{count} queue store write(s) failed: {summary}")]
    StoreWrites { count: usize, summary: String },

    #[error("round cancelled")]
    Cancelled,
}

impl RoundError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Claim(_) => "claim",
            Self::Sweep(_) => "sweep",
            Self::StoreWrites { .. } => "store_writes",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Claims batches from the store and feeds them to a [`TransferProcessor`].
pub struct BatchClaimer {
    store: Arc<dyn TransferQueueStore>,
    processor: TransferProcessor,
    batch_size: usize,
    stale_after: Option<Duration>,
    clock: Arc<dyn Clock>,
    gate: Semaphore,
}

impl BatchClaimer {
    pub fn new(
        store: Arc<dyn TransferQueueStore>,
        processor: TransferProcessor,
        batch_size: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            processor,
            batch_size: batch_size.max(1),
            stale_after: None,
            clock,
            gate: Semaphore::new(1),
        }
    }

    /// Requeue entries stuck in `processing` longer than `stale_after` at the
    /// start of every admitted round.
    pub fn with_stale_sweep(mut self, stale_after: Option<Duration>) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// True while an admitted round holds the gate.
    pub fn is_round_in_flight(&self) -> bool {
        self.gate.available_permits() == 0
    }

    /// Run one round. Returns immediately with [`RoundOutcome::Skipped`] if
    /// another round is in flight.
    pub async fn claim_and_process(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RoundOutcome, RoundError> {
        // Permit is released on every return path when it drops.
        let Ok(_permit) = self.gate.try_acquire() else {
            info!(event = "round_skipped", "Previous transfer round still in flight; skipping");
            return Ok(RoundOutcome::Skipped);
        };

        if cancel.is_cancelled() {
            return Err(RoundError::Cancelled);
        }

        if let Some(stale_after) = self.stale_after {
            self.sweep_stale(stale_after, cancel).await?;
        }

        let batch = self.store.get_next_batch(self.batch_size, cancel).await.map_err(|err| {
            if err.is_cancelled() {
                RoundError::Cancelled
            } else {
                RoundError::Claim(err)
            }
        })?;

        if batch.is_empty() {
            debug!("No eligible transfer entries");
            return Ok(RoundOutcome::Idle);
        }

        info!(count = batch.len(), "Processing transfer batch");

        let mut report = BatchReport { claimed: batch.len(), ..BatchReport::default() };
        let mut store_errors: Vec<String> = Vec::new();

        for (idx, entry) in batch.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = batch.len() - idx;
                break;
            }

            match self.processor.process(entry, cancel).await {
                Ok(outcome) => report.record(&outcome),
                Err(ProcessError::Cancelled) => {
                    report.cancelled = batch.len() - idx;
                    break;
                }
                Err(err) => {
                    warn!(entry_id = %entry.id, error = %err, "Transfer entry store write failed");
                    store_errors.push(err.to_string());
                }
            }
        }

        if report.cancelled > 0 {
            info!(remaining = report.cancelled, "Transfer batch interrupted by cancellation");
        }

        info!(
            claimed = report.claimed,
            completed = report.completed,
            retry_scheduled = report.retry_scheduled,
            requires_review = report.requires_review,
            skipped = report.skipped,
            cancelled = report.cancelled,
            store_errors = store_errors.len(),
            "Transfer batch finished"
        );

        if !store_errors.is_empty() {
            return Err(RoundError::StoreWrites {
                count: store_errors.len(),
                summary: store_errors.join("; "),
            });
        }

        Ok(RoundOutcome::Processed(report))
    }

    async fn sweep_stale(
        &self,
        stale_after: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), RoundError> {
        let now = self.clock.now();
        let cutoff = chrono::Duration::from_std(stale_after)
            .ok()
            .and_then(|threshold| now.checked_sub_signed(threshold))
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

        let requeued =
            self.store.requeue_stale_processing(cutoff, cancel).await.map_err(|err| {
                if err.is_cancelled() {
                    RoundError::Cancelled
                } else {
                    RoundError::Sweep(err)
                }
            })?;

        if requeued > 0 {
            warn!(
                count = requeued,
                stale_after_secs = stale_after.as_secs(),
                event = "stale_processing_requeued",
                "Requeued transfer entries stuck in processing"
            );
        }
        Ok(())
    }
}
