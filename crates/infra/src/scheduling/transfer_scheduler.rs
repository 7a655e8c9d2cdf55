//! Polling scheduler for the transfer queue.
//!
//! Waits `initial_delay` once, then runs a processing round every
//! `processing_interval`. After `max_consecutive_errors` failed rounds in a
//! row the loop sleeps `error_backoff` once before resuming the normal
//! cadence. A round refused by the claimer's gate neither resets nor grows
//! the failure count.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use stockpost_domain::QueueProcessingConfig;
//! use stockpost_infra::observability::metrics::QueueMetrics;
//! use stockpost_infra::scheduling::{RoundRunner, TransferQueueScheduler};
//!
//! # async fn example(claimer: Arc<dyn RoundRunner>) -> Result<(), String> {
//! let metrics = Arc::new(QueueMetrics::new());
//! let mut scheduler =
//!     TransferQueueScheduler::new(claimer, QueueProcessingConfig::default(), metrics);
//!
//! scheduler.start().await.map_err(|e| e.to_string())?;
//! // ... application runs ...
//! scheduler.stop().await.map_err(|e| e.to_string())?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stockpost_core::{BatchClaimer, RoundError, RoundOutcome};
use stockpost_domain::QueueProcessingConfig;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::observability::metrics::QueueMetrics;
use crate::observability::MetricsResult;
use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One processing round, as seen by the polling loop.
#[async_trait]
pub trait RoundRunner: Send + Sync {
    async fn run_round(&self, cancel: &CancellationToken) -> Result<RoundOutcome, RoundError>;
}

#[async_trait]
impl RoundRunner for BatchClaimer {
    async fn run_round(&self, cancel: &CancellationToken) -> Result<RoundOutcome, RoundError> {
        self.claim_and_process(cancel).await
    }
}

/// Background scheduler driving [`run_polling_loop`].
pub struct TransferQueueScheduler {
    runner: Arc<dyn RoundRunner>,
    config: QueueProcessingConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
    metrics: Arc<QueueMetrics>,
}

impl TransferQueueScheduler {
    pub fn new(
        runner: Arc<dyn RoundRunner>,
        config: QueueProcessingConfig,
        metrics: Arc<QueueMetrics>,
    ) -> Self {
        Self {
            runner,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
            metrics,
        }
    }

    /// Start the scheduler
    ///
    /// Spawns the polling loop on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is already running
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(
            interval_secs = self.config.processing_interval_secs,
            initial_delay_secs = self.config.initial_delay_secs,
            batch_size = self.config.batch_size,
            "Starting transfer queue scheduler"
        );

        // Fresh token so the scheduler can be restarted after stop
        self.cancellation_token = CancellationToken::new();

        let runner = Arc::clone(&self.runner);
        let metrics = Arc::clone(&self.metrics);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            run_polling_loop(runner.as_ref(), &config, &cancel, &metrics).await;
        });

        *self.task_handle.lock().await = Some(handle);

        info!("Transfer queue scheduler started");
        Ok(())
    }

    /// Stop the scheduler gracefully
    ///
    /// Cancels the polling loop and awaits it. An in-flight round observes the
    /// cancellation before its next entry.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is not running or the task does not finish
    /// within the join timeout
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping transfer queue scheduler");
        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            tokio::time::timeout(JOIN_TIMEOUT, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: JOIN_TIMEOUT.as_secs() })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        info!("Transfer queue scheduler stopped");
        Ok(())
    }

    /// A scheduler is running while it has an unfinished task handle.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        &self.metrics
    }
}

/// Ensure scheduler is stopped when dropped
impl Drop for TransferQueueScheduler {
    fn drop(&mut self) {
        // Best effort: the handle can't be inspected without async
        if !self.cancellation_token.is_cancelled() {
            warn!("TransferQueueScheduler dropped while running; cancelling");
            self.cancellation_token.cancel();
        }
    }
}

/// The polling loop. Returns once `cancel` fires.
pub async fn run_polling_loop(
    runner: &dyn RoundRunner,
    config: &QueueProcessingConfig,
    cancel: &CancellationToken,
    metrics: &QueueMetrics,
) {
    let max_errors = config.max_consecutive_errors.max(1);
    let mut consecutive_errors: u32 = 0;

    if !sleep_or_cancel(config.initial_delay(), cancel).await {
        debug!("Polling loop cancelled during warm-up");
        return;
    }

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let started = Instant::now();
        let result = runner.run_round(cancel).await;
        let elapsed = started.elapsed();
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(RoundOutcome::Skipped) => {
                log_metric(metrics.record_round_skipped(), "scheduler.transfer.skipped");
            }
            Ok(outcome) => {
                consecutive_errors = 0;
                log_metric(metrics.record_round(), "scheduler.transfer.round");
                log_metric(
                    metrics.record_round_duration(elapsed),
                    "scheduler.transfer.duration",
                );
                if let RoundOutcome::Processed(report) = outcome {
                    log_metric(
                        metrics.record_entries(
                            report.completed,
                            report.retry_scheduled,
                            report.requires_review,
                        ),
                        "scheduler.transfer.entries",
                    );
                    info!(
                        event = "round_completed",
                        claimed = report.claimed,
                        completed = report.completed,
                        retry_scheduled = report.retry_scheduled,
                        requires_review = report.requires_review,
                        skipped = report.skipped,
                        duration_ms,
                        "Transfer round finished"
                    );
                }
            }
            Err(err) if err.is_cancelled() => {
                debug!("Round cancelled; leaving polling loop");
                break;
            }
            Err(err) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                log_metric(metrics.record_round_error(), "scheduler.transfer.error");
                error!(
                    event = "round_failed",
                    error = %err,
                    kind = err.kind(),
                    consecutive_errors,
                    duration_ms,
                    "Transfer round failed"
                );

                if consecutive_errors >= max_errors {
                    warn!(
                        event = "cooldown",
                        consecutive_errors,
                        backoff_secs = config.error_backoff_secs,
                        "Too many consecutive round failures; backing off"
                    );
                    log_metric(metrics.record_cooldown(), "scheduler.transfer.cooldown");
                    consecutive_errors = 0;
                    if !sleep_or_cancel(config.error_backoff(), cancel).await {
                        break;
                    }
                }
            }
        }

        if !sleep_or_cancel(config.processing_interval(), cancel).await {
            break;
        }
    }

    info!("Transfer polling loop exited");
}

/// Returns false if cancelled before `duration` elapsed.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        warn!(metric = metric, error = ?err, "Failed to record scheduler metric");
    }
}
