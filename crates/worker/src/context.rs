//! Worker context - dependency wiring for the posting pipeline

use std::sync::Arc;
use std::time::Duration;

use stockpost_core::{
    BatchClaimer, Clock, ErpTransferClient, RetryPolicy, SystemClock, TransferProcessor,
    TransferQueueStore,
};
use stockpost_domain::{Config, Result, StockpostError};
use stockpost_infra::observability::metrics::QueueMetrics;
use stockpost_infra::{
    DbManager, ServiceLayerClient, SqliteTransferQueueRepository, TransferQueueScheduler,
};
use tracing::{error, info};

const START_TIMEOUT: Duration = Duration::from_secs(10);

/// Holds every long-lived service of the worker process.
pub struct WorkerContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub queue: Arc<dyn TransferQueueStore>,
    pub metrics: Arc<QueueMetrics>,
    scheduler: TransferQueueScheduler,
}

impl WorkerContext {
    /// Open the database, apply migrations and assemble the pipeline.
    ///
    /// Nothing runs until [`start`](Self::start) is called; the ERP is not
    /// contacted until the first entry is posted.
    pub fn new(config: Config) -> Result<Self> {
        let db = Arc::new(DbManager::from_config(&config.database)?);
        db.run_migrations()?;
        info!(path = %db.path().display(), "Queue database ready");

        let erp: Arc<dyn ErpTransferClient> = Arc::new(ServiceLayerClient::new(&config.erp)?);
        Ok(Self::with_erp(config, db, erp))
    }

    /// Assemble the pipeline around an already-open database and ERP client.
    pub fn with_erp(
        config: Config,
        db: Arc<DbManager>,
        erp: Arc<dyn ErpTransferClient>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let queue: Arc<dyn TransferQueueStore> =
            Arc::new(SqliteTransferQueueRepository::new(Arc::clone(&db), Arc::clone(&clock)));

        let queue_config = &config.queue;
        let processor = TransferProcessor::new(
            Arc::clone(&queue),
            erp,
            RetryPolicy::new(queue_config.retry_base_delay()),
            Arc::clone(&clock),
        )
        .with_erp_call_timeout(Some(queue_config.erp_call_timeout()));

        let claimer =
            BatchClaimer::new(Arc::clone(&queue), processor, queue_config.batch_size, clock)
                .with_stale_sweep(queue_config.stale_processing_timeout());

        let metrics = Arc::new(QueueMetrics::new());
        let scheduler = TransferQueueScheduler::new(
            Arc::new(claimer),
            queue_config.clone(),
            Arc::clone(&metrics),
        );

        Self { config, db, queue, metrics, scheduler }
    }

    /// Start the polling scheduler (fail-fast on a slow start).
    pub async fn start(&mut self) -> Result<()> {
        tokio::time::timeout(START_TIMEOUT, self.scheduler.start())
            .await
            .map_err(|_| {
                error!(
                    timeout_secs = START_TIMEOUT.as_secs(),
                    "TransferQueueScheduler start timed out"
                );
                StockpostError::Internal("TransferQueueScheduler start timed out after 10s".into())
            })?
            .map_err(|err| {
                error!(error = %err, "failed to start TransferQueueScheduler");
                StockpostError::from(err)
            })
    }

    /// Stop the scheduler, letting an in-flight entry finish its write.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.scheduler.is_running() {
            self.scheduler.stop().await?;
        }
        info!(metrics = ?self.metrics.snapshot(), "Worker stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }
}
