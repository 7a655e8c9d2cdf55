//! # Stockpost Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - SQLite queue store (`rusqlite` + `r2d2` pool)
//! - HTTP client wrapper and the ERP Service Layer integration
//! - Polling scheduler with explicit start/stop lifecycle
//! - Configuration loading, tracing setup and queue metrics
//!
//! ## Architecture
//! - Implements traits defined in `stockpost-core`
//! - Contains all "impure" code (I/O, network, timers)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod observability;
pub mod scheduling;

// Re-export commonly used items
pub use database::{DbManager, SqliteTransferQueueRepository};
pub use errors::InfraError;
pub use integrations::erp::ServiceLayerClient;
pub use scheduling::{SchedulerError, TransferQueueScheduler};
