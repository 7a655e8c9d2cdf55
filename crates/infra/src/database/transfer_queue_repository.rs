//! SQLite-backed implementation of the transfer queue port.
//!
//! Every status write is a conditional `UPDATE ... WHERE status IN (...)`, so
//! the claim in `mark_processing` stays race-free even with several workers
//! pointed at the same database file. Blocking SQL runs on the blocking pool.
//! A cancelled batch read is abandoned; a write that has started always
//! reports its committed outcome.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use stockpost_core::{Clock, TransferQueueStore};
use stockpost_domain::{QueueEntry, QueueStatus, Result as DomainResult, StatusUpdate, StockpostError};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::manager::{map_sql_error, DbManager};

/// SQLite-backed transfer queue.
pub struct SqliteTransferQueueRepository {
    db: Arc<DbManager>,
    clock: Arc<dyn Clock>,
}

impl SqliteTransferQueueRepository {
    /// Construct a repository backed by the shared manager.
    pub fn new(db: Arc<DbManager>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    async fn run_blocking<T, F>(&self, op: F) -> DomainResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> DomainResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> DomainResult<T> {
            let conn = db.get_connection()?;
            op(&*conn)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Reads may be abandoned mid-flight; nothing is lost when they are.
    async fn run_read<T, F>(&self, cancel: &CancellationToken, op: F) -> DomainResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> DomainResult<T> + Send + 'static,
    {
        ensure_not_cancelled(cancel)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StockpostError::Cancelled),
            result = self.run_blocking(op) => result,
        }
    }

    /// Writes honour cancellation only before the statement starts. Once
    /// running, the result returned is the one that was committed.
    async fn run_write<T, F>(&self, cancel: &CancellationToken, op: F) -> DomainResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> DomainResult<T> + Send + 'static,
    {
        ensure_not_cancelled(cancel)?;
        self.run_blocking(op).await
    }

    fn insert_entry(conn: &Connection, entry: &QueueEntry) -> DomainResult<()> {
        conn.execute(
            INSERT_SQL,
            params![
                entry.id,
                entry.external_reference,
                entry.payload_json,
                entry.is_transfer_request,
                entry.status.to_string(),
                entry.retry_count,
                entry.max_retries,
                entry.next_retry_at.map(to_millis),
                entry.result_doc_entry,
                entry.result_doc_num,
                entry.last_error,
                to_millis(entry.created_at),
                to_millis(entry.updated_at),
                entry.processing_started_at.map(to_millis),
            ],
        )
        .map_err(map_sql_error)?;
        Ok(())
    }

    fn fetch_eligible(
        conn: &Connection,
        limit: usize,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<QueueEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(SELECT_ELIGIBLE_SQL).map_err(map_sql_error)?;
        let rows = stmt
            .query_map(params![to_millis(now), usize_to_i64(limit)], map_entry_row)
            .map_err(map_sql_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
    }

    /// Explain why a conditional update touched no rows.
    fn transition_rejected(conn: &Connection, id: &str, expected: &str) -> StockpostError {
        let current: rusqlite::Result<Option<String>> = conn
            .query_row("SELECT status FROM transfer_queue WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional();

        match current {
            Ok(None) => StockpostError::NotFound(format!("queue entry {id}")),
            Ok(Some(status)) => {
                StockpostError::Conflict(format!("queue entry {id} is {status}, expected {expected}"))
            }
            Err(err) => map_sql_error(err),
        }
    }
}

#[async_trait]
impl TransferQueueStore for SqliteTransferQueueRepository {
    async fn enqueue(&self, entry: &QueueEntry) -> DomainResult<()> {
        let to_insert = entry.clone();
        self.run_blocking(move |conn| Self::insert_entry(conn, &to_insert)).await
    }

    async fn get_next_batch(
        &self,
        limit: usize,
        cancel: &CancellationToken,
    ) -> DomainResult<Vec<QueueEntry>> {
        let now = self.clock.now();
        self.run_read(cancel, move |conn| Self::fetch_eligible(conn, limit, now)).await
    }

    async fn mark_processing(&self, id: &str, cancel: &CancellationToken) -> DomainResult<()> {
        let id = id.to_string();
        let now = to_millis(self.clock.now());

        self.run_write(cancel, move |conn| {
            let changed = conn.execute(MARK_PROCESSING_SQL, params![id, now]).map_err(map_sql_error)?;
            if changed == 0 {
                return Err(Self::transition_rejected(conn, &id, "pending or failed"));
            }
            debug!(entry_id = %id, "Entry marked processing");
            Ok(())
        })
        .await
    }

    async fn update_status(
        &self,
        id: &str,
        update: &StatusUpdate,
        cancel: &CancellationToken,
    ) -> DomainResult<()> {
        let id = id.to_string();
        let update = update.clone();
        let now = to_millis(self.clock.now());

        self.run_write(cancel, move |conn| {
            let changed = conn
                .execute(
                    UPDATE_STATUS_SQL,
                    params![
                        id,
                        update.status.to_string(),
                        update.retry_count,
                        update.next_retry_at.map(to_millis),
                        update.result_doc_entry,
                        update.result_doc_num,
                        update.last_error,
                        now,
                    ],
                )
                .map_err(map_sql_error)?;
            if changed == 0 {
                return Err(Self::transition_rejected(conn, &id, "processing"));
            }
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<QueueEntry>> {
        let id = id.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM transfer_queue WHERE id = ?1"),
                params![id],
                map_entry_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
    }

    async fn list_by_status(
        &self,
        status: QueueStatus,
        limit: usize,
    ) -> DomainResult<Vec<QueueEntry>> {
        self.run_blocking(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {COLUMNS} FROM transfer_queue WHERE status = ?1
                     ORDER BY created_at ASC, id ASC LIMIT ?2"
                ))
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![status.to_string(), usize_to_i64(limit)], map_entry_row)
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
    }

    async fn requeue_stale_processing(
        &self,
        started_before: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> DomainResult<usize> {
        let cutoff = to_millis(started_before);
        let now = to_millis(self.clock.now());

        self.run_write(cancel, move |conn| {
            conn.execute(REQUEUE_STALE_SQL, params![cutoff, now]).map_err(map_sql_error)
        })
        .await
    }
}

const COLUMNS: &str = "id, external_reference, payload_json, is_transfer_request, status,
        retry_count, max_retries, next_retry_at, result_doc_entry, result_doc_num, last_error,
        created_at, updated_at, processing_started_at";

const INSERT_SQL: &str = "INSERT INTO transfer_queue (
        id, external_reference, payload_json, is_transfer_request, status,
        retry_count, max_retries, next_retry_at, result_doc_entry, result_doc_num, last_error,
        created_at, updated_at, processing_started_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

const SELECT_ELIGIBLE_SQL: &str = "SELECT
        id, external_reference, payload_json, is_transfer_request, status,
        retry_count, max_retries, next_retry_at, result_doc_entry, result_doc_num, last_error,
        created_at, updated_at, processing_started_at
    FROM transfer_queue
    WHERE status = 'pending'
       OR (status = 'failed' AND (next_retry_at IS NULL OR next_retry_at <= ?1))
    ORDER BY created_at ASC, id ASC
    LIMIT ?2";

const MARK_PROCESSING_SQL: &str = "UPDATE transfer_queue
    SET status = 'processing', processing_started_at = ?2, updated_at = ?2
    WHERE id = ?1 AND status IN ('pending', 'failed')";

const UPDATE_STATUS_SQL: &str = "UPDATE transfer_queue
    SET status = ?2, retry_count = ?3, next_retry_at = ?4, result_doc_entry = ?5,
        result_doc_num = ?6, last_error = ?7, processing_started_at = NULL, updated_at = ?8
    WHERE id = ?1 AND status = 'processing'";

const REQUEUE_STALE_SQL: &str = "UPDATE transfer_queue
    SET status = 'pending', processing_started_at = NULL, updated_at = ?2
    WHERE status = 'processing' AND processing_started_at < ?1";

fn map_entry_row(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    let status_raw: String = row.get(4)?;
    let status = status_raw.parse::<QueueStatus>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, err.into())
    })?;

    Ok(QueueEntry {
        id: row.get(0)?,
        external_reference: row.get(1)?,
        payload_json: row.get(2)?,
        is_transfer_request: row.get(3)?,
        status,
        retry_count: row.get(5)?,
        max_retries: row.get(6)?,
        next_retry_at: row.get::<_, Option<i64>>(7)?.map(|ms| from_millis(7, ms)).transpose()?,
        result_doc_entry: row.get(8)?,
        result_doc_num: row.get(9)?,
        last_error: row.get(10)?,
        created_at: from_millis(11, row.get(11)?)?,
        updated_at: from_millis(12, row.get(12)?)?,
        processing_started_at: row
            .get::<_, Option<i64>>(13)?
            .map(|ms| from_millis(13, ms))
            .transpose()?,
    })
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(column: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Integer,
            format!("timestamp {ms} out of range").into(),
        )
    })
}

fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> DomainResult<()> {
    if cancel.is_cancelled() {
        return Err(StockpostError::Cancelled);
    }
    Ok(())
}

fn map_join_error(err: task::JoinError) -> StockpostError {
    if err.is_cancelled() {
        StockpostError::Internal("blocking task cancelled".into())
    } else {
        StockpostError::Internal(format!("blocking task panicked: {err}"))
    }
}
