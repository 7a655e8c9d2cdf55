//! Scheduler error types

use stockpost_domain::StockpostError;
use thiserror::Error;

use crate::errors::InfraError;

/// Scheduler lifecycle errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Scheduler is already running
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler not running")]
    NotRunning,

    /// Polling task did not finish within the join timeout
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Task join failed
    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let stockpost_err = match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                StockpostError::InvalidInput(err.to_string())
            }
            SchedulerError::Timeout { .. } | SchedulerError::TaskJoinFailed(_) => {
                StockpostError::Internal(err.to_string())
            }
        };
        InfraError(stockpost_err)
    }
}

impl From<SchedulerError> for StockpostError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_misuse_maps_to_invalid_input() {
        let err: StockpostError = SchedulerError::AlreadyRunning.into();
        assert!(matches!(err, StockpostError::InvalidInput(_)));

        let err: StockpostError = SchedulerError::Timeout { seconds: 5 }.into();
        assert_eq!(err, StockpostError::Internal("Operation timed out after 5s".into()));
    }
}
