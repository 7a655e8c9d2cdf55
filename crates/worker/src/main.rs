//! Stockpost worker - posts queued inventory transfers to the ERP.
//!
//! Usage: `stockpost-worker [--config <path>]`. Without `--config` the
//! configuration comes from `STOCKPOST_*` variables (a `.env` file is
//! honoured) or a probed `config.{json,toml}`.

use std::path::PathBuf;

use anyhow::Context;
use stockpost_infra::config;
use stockpost_infra::observability::logging::init_tracing;
use stockpost_worker::WorkerContext;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    let config = match config_path_arg() {
        Some(path) => config::load_from_file(Some(path)),
        None => config::load(),
    }
    .context("failed to load configuration")?;

    init_tracing(&config.logging).context("failed to initialise logging")?;

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(e) => debug!(error = %e, "No .env file loaded"),
    }

    if !config.queue.enabled {
        warn!("Queue processing is disabled in configuration; exiting");
        return Ok(());
    }

    let mut ctx = WorkerContext::new(config).context("failed to initialise worker")?;
    ctx.start().await.context("failed to start scheduler")?;
    info!("Stockpost worker running; press Ctrl+C to stop");

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    ctx.shutdown().await.context("failed to stop scheduler")?;
    Ok(())
}

/// `--config <path>` or `--config=<path>`.
fn config_path_arg() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}
