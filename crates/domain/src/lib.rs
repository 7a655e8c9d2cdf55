//! # Stockpost Domain
//!
//! Business domain types for the queued inventory-transfer posting pipeline.
//!
//! This crate contains:
//! - Queue entry model and its status state machine
//! - Transfer payload and ERP-facing document shapes
//! - Domain error types and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other Stockpost crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
