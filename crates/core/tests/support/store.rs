//! In-memory `TransferQueueStore`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stockpost_core::{Clock, TransferQueueStore};
use stockpost_domain::{QueueEntry, QueueStatus, Result as DomainResult, StatusUpdate, StockpostError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Vec-backed queue honouring the same compare-and-set rules as the SQLite store.
pub struct InMemoryQueueStore {
    entries: Mutex<Vec<QueueEntry>>,
    clock: Arc<dyn Clock>,
    writes: Mutex<Vec<String>>,
    fail_batches: AtomicBool,
    fail_updates: AtomicBool,
    cancel_on_claim: Mutex<Option<CancellationToken>>,
}

impl InMemoryQueueStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            clock,
            writes: Mutex::new(Vec::new()),
            fail_batches: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            cancel_on_claim: Mutex::new(None),
        }
    }

    pub async fn seed(&self, entries: impl IntoIterator<Item = QueueEntry>) {
        self.entries.lock().await.extend(entries);
    }

    pub async fn get(&self, id: &str) -> QueueEntry {
        self.entries
            .lock()
            .await
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
            .expect("entry should exist")
    }

    /// Every status write, in order: `"mark_processing:<id>"` or `"update_status:<id>:<status>"`.
    pub async fn writes(&self) -> Vec<String> {
        self.writes.lock().await.clone()
    }

    pub fn fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Cancel `token` right after the next claim commits, as a shutdown
    /// landing while the claim write is in flight would.
    pub async fn cancel_on_next_claim(&self, token: CancellationToken) {
        *self.cancel_on_claim.lock().await = Some(token);
    }

    /// Overwrite an entry's status directly, as a competing worker would.
    pub async fn force_status(&self, id: &str, status: QueueStatus) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|entry| entry.id == id) {
            entry.status = status;
        }
    }
}

#[async_trait]
impl TransferQueueStore for InMemoryQueueStore {
    async fn enqueue(&self, entry: &QueueEntry) -> DomainResult<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    async fn get_next_batch(
        &self,
        limit: usize,
        cancel: &CancellationToken,
    ) -> DomainResult<Vec<QueueEntry>> {
        if cancel.is_cancelled() {
            return Err(StockpostError::Cancelled);
        }
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(StockpostError::Database("queue store unreachable".into()));
        }

        let now = self.clock.now();
        let mut eligible: Vec<QueueEntry> =
            self.entries.lock().await.iter().filter(|e| e.is_eligible(now)).cloned().collect();
        eligible.sort_by_key(|e| e.created_at);
        eligible.truncate(limit);
        Ok(eligible)
    }

    async fn mark_processing(&self, id: &str, cancel: &CancellationToken) -> DomainResult<()> {
        if cancel.is_cancelled() {
            return Err(StockpostError::Cancelled);
        }

        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| StockpostError::NotFound(format!("queue entry {id}")))?;

        if !entry.status.is_claimable() {
            return Err(StockpostError::Conflict(format!(
                "queue entry {id} is {}, not claimable",
                entry.status
            )));
        }

        entry.status = QueueStatus::Processing;
        entry.processing_started_at = Some(now);
        entry.updated_at = now;
        self.writes.lock().await.push(format!("mark_processing:{id}"));
        if let Some(token) = self.cancel_on_claim.lock().await.take() {
            token.cancel();
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        update: &StatusUpdate,
        cancel: &CancellationToken,
    ) -> DomainResult<()> {
        if cancel.is_cancelled() {
            return Err(StockpostError::Cancelled);
        }
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StockpostError::Database("disk I/O error".into()));
        }

        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| StockpostError::NotFound(format!("queue entry {id}")))?;

        if entry.status != QueueStatus::Processing {
            return Err(StockpostError::Conflict(format!("queue entry {id} is not processing")));
        }

        entry.apply(update, now);
        self.writes.lock().await.push(format!("update_status:{id}:{}", update.status));
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<QueueEntry>> {
        Ok(self.entries.lock().await.iter().find(|entry| entry.id == id).cloned())
    }

    async fn list_by_status(
        &self,
        status: QueueStatus,
        limit: usize,
    ) -> DomainResult<Vec<QueueEntry>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|entry| entry.status == status)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn requeue_stale_processing(
        &self,
        started_before: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> DomainResult<usize> {
        if cancel.is_cancelled() {
            return Err(StockpostError::Cancelled);
        }

        let now = self.clock.now();
        let mut requeued = 0;
        for entry in self.entries.lock().await.iter_mut() {
            let stale = entry.status == QueueStatus::Processing
                && entry.processing_started_at.is_some_and(|at| at < started_before);
            if stale {
                entry.status = QueueStatus::Pending;
                entry.processing_started_at = None;
                entry.updated_at = now;
                requeued += 1;
            }
        }
        Ok(requeued)
    }
}
