//! Observability infrastructure: queue metrics and logging setup
//!
//! ## Design Principles
//!
//! 1. **Checked Counters**: record methods return `MetricsResult<()>` and
//!    refuse an increment that would wrap, reporting `MetricsError::Overflow`.
//!
//! 2. **Callers never fail on metrics**: call sites route results through a
//!    `log_metric` helper that downgrades errors to a warning.
//!
//! ```rust
//! use stockpost_infra::observability::metrics::QueueMetrics;
//!
//! let metrics = QueueMetrics::new();
//! if let Err(e) = metrics.record_round() {
//!     tracing::warn!("Failed to record metric: {}", e);
//! }
//! ```

pub mod logging;
pub mod metrics;

/// Metrics error type
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Counter would overflow
    #[error("Counter overflow for metric '{metric}'")]
    Overflow {
        /// Metric name that overflowed
        metric: &'static str,
    },
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;
