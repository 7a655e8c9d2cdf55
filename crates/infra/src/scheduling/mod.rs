//! Scheduling infrastructure for the transfer queue
//!
//! The scheduler follows the runtime rules used across the infra crate:
//! - Explicit lifecycle management (start/stop)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout wrapping on shutdown
//! - Structured tracing with `QueueMetrics` integration

pub mod error;
pub mod transfer_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use transfer_scheduler::{run_polling_loop, RoundRunner, TransferQueueScheduler};
