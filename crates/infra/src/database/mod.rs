//! SQLite persistence for the transfer queue

pub mod manager;
pub mod transfer_queue_repository;

pub use manager::{DbManager, SqliteConnection};
pub use transfer_queue_repository::SqliteTransferQueueRepository;
