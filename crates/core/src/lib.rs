//! # Stockpost Core
//!
//! Pure business logic for posting queued inventory transfers to an ERP
//! system - no database or HTTP code.
//!
//! This crate contains:
//! - Port interfaces for the queue store and the ERP client (traits)
//! - The retry/backoff policy
//! - Per-entry processing state machine and batch claiming
//!
//! ## Architecture Principles
//! - Only depends on `stockpost-domain`
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod transfer_queue;
pub mod utils;

// Re-export specific items to avoid ambiguity
pub use transfer_queue::claimer::{BatchClaimer, BatchReport, RoundError, RoundOutcome};
pub use transfer_queue::documents::build_document;
pub use transfer_queue::ports::{ErpTransferClient, TransferQueueStore};
pub use transfer_queue::processor::{EntryOutcome, ProcessError, TransferProcessor};
pub use transfer_queue::retry_policy::{truncate_error, RetryDecision, RetryPolicy};
pub use utils::clock::{Clock, ManualClock, SystemClock};
