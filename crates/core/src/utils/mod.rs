//! Shared utilities for core services

pub mod clock;
