//! Metrics collection modules

pub mod queue;

pub use queue::{QueueMetrics, QueueMetricsSnapshot};
