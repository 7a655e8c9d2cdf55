//! Configuration structures
//!
//! Loaded by `stockpost_infra::config` from environment variables or a
//! JSON/TOML file. Every queue-processing knob has a default so a config file
//! only needs the database and ERP sections.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_ERP_CALL_TIMEOUT_SECS, DEFAULT_ERROR_BACKOFF_SECS,
    DEFAULT_INITIAL_DELAY_SECS, DEFAULT_MAX_CONSECUTIVE_ERRORS, DEFAULT_PROCESSING_INTERVAL_SECS,
    DEFAULT_RETRY_BASE_DELAY_SECS,
};

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub erp: ErpConfig,
    #[serde(default)]
    pub queue: QueueProcessingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// Connection settings for the ERP Service Layer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErpConfig {
    pub base_url: String,
    pub company_db: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Trust self-signed server certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl fmt::Debug for ErpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErpConfig")
            .field("base_url", &self.base_url)
            .field("company_db", &self.company_db)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

impl ErpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Knobs for the polling scheduler, batch claim and retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueProcessingConfig {
    pub enabled: bool,
    pub processing_interval_secs: u64,
    /// Warm-up delay observed once before the first round.
    pub initial_delay_secs: u64,
    pub batch_size: usize,
    pub max_consecutive_errors: u32,
    /// Cool-down applied after `max_consecutive_errors` round failures.
    pub error_backoff_secs: u64,
    pub retry_base_delay_secs: u64,
    pub erp_call_timeout_secs: u64,
    /// When set, entries stuck in `processing` longer than this are requeued.
    pub stale_processing_timeout_secs: Option<u64>,
}

impl Default for QueueProcessingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            processing_interval_secs: DEFAULT_PROCESSING_INTERVAL_SECS,
            initial_delay_secs: DEFAULT_INITIAL_DELAY_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            error_backoff_secs: DEFAULT_ERROR_BACKOFF_SECS,
            retry_base_delay_secs: DEFAULT_RETRY_BASE_DELAY_SECS,
            erp_call_timeout_secs: DEFAULT_ERP_CALL_TIMEOUT_SECS,
            stale_processing_timeout_secs: None,
        }
    }
}

impl QueueProcessingConfig {
    pub fn processing_interval(&self) -> Duration {
        Duration::from_secs(self.processing_interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs)
    }

    pub fn erp_call_timeout(&self) -> Duration {
        Duration::from_secs(self.erp_call_timeout_secs)
    }

    pub fn stale_processing_timeout(&self) -> Option<Duration> {
        self.stale_processing_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit newline-delimited JSON instead of human-readable lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

fn default_pool_size() -> u32 {
    4
}

fn default_request_timeout_secs() -> u64 {
    30
}
