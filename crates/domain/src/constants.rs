//! Application constants
//!
//! Centralized location for domain-level constants used by the transfer
//! posting pipeline.

/// Maximum number of characters of failure text kept on a queue entry.
pub const MAX_LAST_ERROR_CHARS: usize = 1900;
/// Appended to failure text that was cut at [`MAX_LAST_ERROR_CHARS`].
pub const ERROR_TRUNCATION_MARKER: &str = "...";

// Queue processing defaults
pub const DEFAULT_PROCESSING_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_INITIAL_DELAY_SECS: u64 = 7;
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 10;
pub const DEFAULT_ERROR_BACKOFF_SECS: u64 = 60;
pub const DEFAULT_RETRY_BASE_DELAY_SECS: u64 = 10;
pub const DEFAULT_ERP_CALL_TIMEOUT_SECS: u64 = 60;
