//! Transfer queue processing metrics
//!
//! Counters are independent, so `Relaxed` ordering is enough; `snapshot()`
//! is a best-effort view, not a consistent cut.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::observability::{MetricsError, MetricsResult};

/// Counters for the polling scheduler and the entries it processes.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    rounds: AtomicU64,
    round_errors: AtomicU64,
    rounds_skipped: AtomicU64,
    cooldowns: AtomicU64,
    entries_completed: AtomicU64,
    entries_retry_scheduled: AtomicU64,
    entries_requires_review: AtomicU64,
    last_round_ms: AtomicU64,
}

/// Point-in-time copy of [`QueueMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueMetricsSnapshot {
    pub rounds: u64,
    pub round_errors: u64,
    pub rounds_skipped: u64,
    pub cooldowns: u64,
    pub entries_completed: u64,
    pub entries_retry_scheduled: u64,
    pub entries_requires_review: u64,
    pub last_round_ms: u64,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_round(&self) -> MetricsResult<()> {
        bump(&self.rounds, 1, "rounds")
    }

    pub fn record_round_error(&self) -> MetricsResult<()> {
        bump(&self.round_errors, 1, "round_errors")
    }

    pub fn record_round_skipped(&self) -> MetricsResult<()> {
        bump(&self.rounds_skipped, 1, "rounds_skipped")
    }

    pub fn record_cooldown(&self) -> MetricsResult<()> {
        bump(&self.cooldowns, 1, "cooldowns")
    }

    pub fn record_round_duration(&self, elapsed: Duration) -> MetricsResult<()> {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.last_round_ms.store(ms, Ordering::Relaxed);
        Ok(())
    }

    /// Add one round's entry outcomes.
    pub fn record_entries(
        &self,
        completed: usize,
        retry_scheduled: usize,
        requires_review: usize,
    ) -> MetricsResult<()> {
        bump(&self.entries_completed, to_u64(completed), "entries_completed")?;
        bump(&self.entries_retry_scheduled, to_u64(retry_scheduled), "entries_retry_scheduled")?;
        bump(&self.entries_requires_review, to_u64(requires_review), "entries_requires_review")
    }

    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            rounds: self.rounds.load(Ordering::Relaxed),
            round_errors: self.round_errors.load(Ordering::Relaxed),
            rounds_skipped: self.rounds_skipped.load(Ordering::Relaxed),
            cooldowns: self.cooldowns.load(Ordering::Relaxed),
            entries_completed: self.entries_completed.load(Ordering::Relaxed),
            entries_retry_scheduled: self.entries_retry_scheduled.load(Ordering::Relaxed),
            entries_requires_review: self.entries_requires_review.load(Ordering::Relaxed),
            last_round_ms: self.last_round_ms.load(Ordering::Relaxed),
        }
    }
}

/// Add `by` to `counter`, leaving it untouched if the sum would wrap.
fn bump(counter: &AtomicU64, by: u64, metric: &'static str) -> MetricsResult<()> {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| current.checked_add(by))
        .map(|_| ())
        .map_err(|_| MetricsError::Overflow { metric })
}

fn to_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}
