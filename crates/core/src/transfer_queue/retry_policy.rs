//! Retry/backoff policy for failed transfer attempts
//!
//! Pure: no I/O and no clock of its own. Given how many attempts an entry has
//! already used and its ceiling, decide whether the failure is terminal and,
//! if not, how long to wait before the next claim.

use std::time::Duration;

use chrono::{DateTime, Utc};
use stockpost_domain::constants::{ERROR_TRUNCATION_MARKER, MAX_LAST_ERROR_CHARS};
use stockpost_domain::{QueueEntry, QueueStatus, StatusUpdate};

/// Outcome of applying the policy to one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// `Failed` (will be retried) or `RequiresReview` (terminal)
    pub status: QueueStatus,
    /// Attempts used including the failure just observed
    pub retry_count: u32,
    /// Delay before the entry becomes eligible again; `None` when terminal
    pub delay: Option<Duration>,
}

impl RetryDecision {
    pub fn is_terminal(&self) -> bool {
        self.status == QueueStatus::RequiresReview
    }
}

/// Unjittered exponential backoff: `base × 2^attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::from_secs(10) }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration) -> Self {
        Self { base_delay }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay before attempt number `attempt` (1-based count of failures so far).
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn backoff(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Decide the next state for an entry that just failed with `retry_count`
    /// attempts already recorded (this failure not yet counted).
    pub fn decide(&self, retry_count: u32, max_retries: u32) -> RetryDecision {
        let new_retry_count = retry_count.saturating_add(1);

        if new_retry_count >= max_retries {
            return RetryDecision {
                status: QueueStatus::RequiresReview,
                // Never record more attempts than the ceiling allows.
                retry_count: new_retry_count.min(max_retries),
                delay: None,
            };
        }

        RetryDecision {
            status: QueueStatus::Failed,
            retry_count: new_retry_count,
            delay: Some(self.backoff(new_retry_count)),
        }
    }

    /// Build the status update persisted after a failed attempt.
    pub fn failure_update(
        &self,
        entry: &QueueEntry,
        error: &str,
        now: DateTime<Utc>,
    ) -> (RetryDecision, StatusUpdate) {
        let decision = self.decide(entry.retry_count, entry.max_retries);
        let message = truncate_error(error);

        let update = match decision.delay {
            Some(delay) => {
                StatusUpdate::retry_scheduled(decision.retry_count, add_delay(now, delay), message)
            }
            None => StatusUpdate::requires_review(decision.retry_count, message),
        };

        (decision, update)
    }
}

/// Cap failure text at [`MAX_LAST_ERROR_CHARS`] characters, appending
/// [`ERROR_TRUNCATION_MARKER`] when anything was cut.
pub fn truncate_error(text: &str) -> String {
    match text.char_indices().nth(MAX_LAST_ERROR_CHARS) {
        None => text.to_string(),
        Some((cut, _)) => {
            let mut truncated = String::with_capacity(cut + ERROR_TRUNCATION_MARKER.len());
            truncated.push_str(&text[..cut]);
            truncated.push_str(ERROR_TRUNCATION_MARKER);
            truncated
        }
    }
}

fn add_delay(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
