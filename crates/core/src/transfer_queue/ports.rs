//! Port interfaces for transfer queue processing

use async_trait::async_trait;
use stockpost_domain::{
    ErpError, ErpTransferDocument, PostedDocument, QueueEntry, QueueStatus, Result, StatusUpdate,
};
use tokio_util::sync::CancellationToken;

/// Durable storage for queue entries.
///
/// Status writes are compare-and-set: implementations must make the claim in
/// [`mark_processing`](Self::mark_processing) atomic so two callers can never
/// both win the same entry.
#[async_trait]
pub trait TransferQueueStore: Send + Sync {
    /// Persist a new entry
    async fn enqueue(&self, entry: &QueueEntry) -> Result<()>;

    /// Up to `limit` entries that are `pending`, or `failed` with
    /// `next_retry_at <= now`, oldest first. An empty batch is not an error.
    async fn get_next_batch(
        &self,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<QueueEntry>>;

    /// Transition `pending|failed` → `processing`.
    ///
    /// Fails with `NotFound` if the entry no longer exists and `Conflict` if
    /// it is no longer claimable.
    async fn mark_processing(&self, id: &str, cancel: &CancellationToken) -> Result<()>;

    /// Persist the post-attempt state of a `processing` entry.
    async fn update_status(
        &self,
        id: &str,
        update: &StatusUpdate,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Fetch a single entry
    async fn find_by_id(&self, id: &str) -> Result<Option<QueueEntry>>;

    /// Entries in `status`, oldest first (e.g. the `requires_review` backlog)
    async fn list_by_status(&self, status: QueueStatus, limit: usize) -> Result<Vec<QueueEntry>>;

    /// Return entries claimed before `started_before` and still `processing`
    /// to `pending`. Returns the number of entries requeued.
    async fn requeue_stale_processing(
        &self,
        started_before: chrono::DateTime<chrono::Utc>,
        cancel: &CancellationToken,
    ) -> Result<usize>;
}

/// Gateway that creates transfer documents in the ERP system.
#[async_trait]
pub trait ErpTransferClient: Send + Sync {
    /// Create a transfer request that awaits approval in the ERP.
    async fn post_transfer_request(
        &self,
        document: &ErpTransferDocument,
        cancel: &CancellationToken,
    ) -> std::result::Result<PostedDocument, ErpError>;

    /// Create an immediately effective stock transfer.
    async fn post_direct_transfer(
        &self,
        document: &ErpTransferDocument,
        cancel: &CancellationToken,
    ) -> std::result::Result<PostedDocument, ErpError>;
}
