//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If a required variable is missing, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! Required:
//! - `STOCKPOST_DB_PATH`: SQLite database file path
//! - `STOCKPOST_ERP_BASE_URL`: Service Layer base URL (e.g. `https://host:50000/b1s/v1`)
//! - `STOCKPOST_ERP_COMPANY_DB`, `STOCKPOST_ERP_USERNAME`, `STOCKPOST_ERP_PASSWORD`
//!
//! Optional (defaults in parentheses):
//! - `STOCKPOST_DB_POOL_SIZE` (4)
//! - `STOCKPOST_ERP_REQUEST_TIMEOUT` seconds (30)
//! - `STOCKPOST_ERP_ACCEPT_INVALID_CERTS` (false)
//! - `STOCKPOST_QUEUE_ENABLED` (true)
//! - `STOCKPOST_QUEUE_INTERVAL` seconds (10)
//! - `STOCKPOST_QUEUE_INITIAL_DELAY` seconds (7)
//! - `STOCKPOST_QUEUE_BATCH_SIZE` (5)
//! - `STOCKPOST_QUEUE_MAX_CONSECUTIVE_ERRORS` (10)
//! - `STOCKPOST_QUEUE_ERROR_BACKOFF` seconds (60)
//! - `STOCKPOST_QUEUE_RETRY_BASE_DELAY` seconds (10)
//! - `STOCKPOST_QUEUE_ERP_CALL_TIMEOUT` seconds (60)
//! - `STOCKPOST_QUEUE_STALE_TIMEOUT` seconds (unset: no stale sweep)
//! - `STOCKPOST_LOG_LEVEL` (`info`), `STOCKPOST_LOG_JSON` (false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.{json,toml}` or `./stockpost.{json,toml}`
//! 2. `../config.{json,toml}` and `../../config.{json,toml}`
//! 3. The same names relative to the executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use stockpost_domain::{
    Config, DatabaseConfig, ErpConfig, LoggingConfig, QueueProcessingConfig, Result,
    StockpostError,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `StockpostError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Required fields are missing or values fail validation
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `StockpostError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<Config> {
    let defaults = QueueProcessingConfig::default();
    let log_defaults = LoggingConfig::default();

    let config = Config {
        database: DatabaseConfig {
            path: env_var("STOCKPOST_DB_PATH")?,
            pool_size: env_parse("STOCKPOST_DB_POOL_SIZE")?.unwrap_or(4),
        },
        erp: ErpConfig {
            base_url: env_var("STOCKPOST_ERP_BASE_URL")?,
            company_db: env_var("STOCKPOST_ERP_COMPANY_DB")?,
            username: env_var("STOCKPOST_ERP_USERNAME")?,
            password: env_var("STOCKPOST_ERP_PASSWORD")?,
            request_timeout_secs: env_parse("STOCKPOST_ERP_REQUEST_TIMEOUT")?.unwrap_or(30),
            accept_invalid_certs: env_bool("STOCKPOST_ERP_ACCEPT_INVALID_CERTS", false),
        },
        queue: QueueProcessingConfig {
            enabled: env_bool("STOCKPOST_QUEUE_ENABLED", defaults.enabled),
            processing_interval_secs: env_parse("STOCKPOST_QUEUE_INTERVAL")?
                .unwrap_or(defaults.processing_interval_secs),
            initial_delay_secs: env_parse("STOCKPOST_QUEUE_INITIAL_DELAY")?
                .unwrap_or(defaults.initial_delay_secs),
            batch_size: env_parse("STOCKPOST_QUEUE_BATCH_SIZE")?.unwrap_or(defaults.batch_size),
            max_consecutive_errors: env_parse("STOCKPOST_QUEUE_MAX_CONSECUTIVE_ERRORS")?
                .unwrap_or(defaults.max_consecutive_errors),
            error_backoff_secs: env_parse("STOCKPOST_QUEUE_ERROR_BACKOFF")?
                .unwrap_or(defaults.error_backoff_secs),
            retry_base_delay_secs: env_parse("STOCKPOST_QUEUE_RETRY_BASE_DELAY")?
                .unwrap_or(defaults.retry_base_delay_secs),
            erp_call_timeout_secs: env_parse("STOCKPOST_QUEUE_ERP_CALL_TIMEOUT")?
                .unwrap_or(defaults.erp_call_timeout_secs),
            stale_processing_timeout_secs: env_parse("STOCKPOST_QUEUE_STALE_TIMEOUT")?,
        },
        logging: LoggingConfig {
            level: std::env::var("STOCKPOST_LOG_LEVEL").unwrap_or(log_defaults.level),
            json: env_bool("STOCKPOST_LOG_JSON", log_defaults.json),
        },
    };

    validate(&config)?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `StockpostError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - Required fields are missing
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(StockpostError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            StockpostError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| StockpostError::Config(format!("Failed to read config file: {}", e)))?;

    let config = parse_config(&contents, &config_path)?;
    validate(&config)?;
    Ok(config)
}

/// Parse configuration from string content, format chosen by extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| StockpostError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| StockpostError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(StockpostError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Reject values the pipeline cannot run with.
pub fn validate(config: &Config) -> Result<()> {
    if config.database.path.trim().is_empty() {
        return Err(StockpostError::Config("database.path must not be empty".into()));
    }
    if config.database.pool_size == 0 {
        return Err(StockpostError::Config("database.pool_size must be at least 1".into()));
    }
    if config.erp.base_url.trim().is_empty() {
        return Err(StockpostError::Config("erp.base_url must not be empty".into()));
    }
    if config.queue.batch_size == 0 {
        return Err(StockpostError::Config("queue.batch_size must be at least 1".into()));
    }
    if config.queue.processing_interval_secs == 0 {
        return Err(StockpostError::Config(
            "queue.processing_interval_secs must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidate_names(&cwd));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidate_names(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn candidate_names(base: &Path) -> Vec<PathBuf> {
    vec![
        base.join("config.json"),
        base.join("config.toml"),
        base.join("stockpost.json"),
        base.join("stockpost.toml"),
        base.join("../config.json"),
        base.join("../config.toml"),
        base.join("../../config.json"),
        base.join("../../config.toml"),
    ]
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        StockpostError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Parse an optional environment variable; unset yields `None`.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| StockpostError::Config(format!("Invalid value for {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
