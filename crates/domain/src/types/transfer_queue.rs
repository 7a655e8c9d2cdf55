//! Transfer queue model
//!
//! One [`QueueEntry`] is one inventory transfer waiting to be posted to the
//! ERP system. The entry moves through the [`QueueStatus`] state machine:
//!
//! ```text
//! Pending ──claim──► Processing ──ok──► Completed
//!    ▲                   │
//!    │                   ├──fail, attempts left──► Failed ──(next_retry_at)──► claim
//!    │                   └──fail, exhausted─────► RequiresReview
//!    └──── stale sweep ──┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::erp::PostedDocument;

/// Queue entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    RequiresReview,
}

crate::impl_domain_status_conversions!(QueueStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
    RequiresReview => "requires_review"
});

impl QueueStatus {
    /// Terminal states are never claimed again by the pipeline.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::RequiresReview)
    }

    /// States a claim may transition out of.
    pub fn is_claimable(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

/// Which ERP document an entry turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Immediately effective stock transfer.
    Direct,
    /// Transfer request awaiting approval in the ERP system.
    Request,
}

crate::impl_domain_status_conversions!(DocumentKind {
    Direct => "direct",
    Request => "request"
});

impl DocumentKind {
    pub fn from_request_flag(is_transfer_request: bool) -> Self {
        if is_transfer_request {
            Self::Request
        } else {
            Self::Direct
        }
    }
}

/// One inventory-transfer job in the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String, // UUIDv7
    /// Caller-supplied correlation key; uniqueness is the caller's concern.
    pub external_reference: String,
    pub payload_json: String,
    pub is_transfer_request: bool,
    pub status: QueueStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub result_doc_entry: Option<i64>,
    pub result_doc_num: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Build a fresh `Pending` entry ready to be enqueued.
    pub fn new(
        external_reference: impl Into<String>,
        payload_json: impl Into<String>,
        is_transfer_request: bool,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            external_reference: external_reference.into(),
            payload_json: payload_json.into(),
            is_transfer_request,
            status: QueueStatus::Pending,
            retry_count: 0,
            max_retries,
            next_retry_at: None,
            result_doc_entry: None,
            result_doc_num: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
        }
    }

    pub fn document_kind(&self) -> DocumentKind {
        DocumentKind::from_request_flag(self.is_transfer_request)
    }

    /// Whether a batch claim at `now` may pick this entry up.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            QueueStatus::Pending => true,
            QueueStatus::Failed => self.next_retry_at.map_or(true, |at| at <= now),
            _ => false,
        }
    }

    /// Apply a persisted status transition to this in-memory copy.
    pub fn apply(&mut self, update: &StatusUpdate, now: DateTime<Utc>) {
        self.status = update.status;
        self.retry_count = update.retry_count;
        self.next_retry_at = update.next_retry_at;
        self.result_doc_entry = update.result_doc_entry;
        self.result_doc_num = update.result_doc_num.clone();
        self.last_error = update.last_error.clone();
        self.processing_started_at = None;
        self.updated_at = now;
    }

    /// Check the data-model invariants, returning the first one violated.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.retry_count > self.max_retries {
            return Err(format!(
                "retry_count {} exceeds max_retries {}",
                self.retry_count, self.max_retries
            ));
        }
        if self.status == QueueStatus::Completed
            && (self.result_doc_entry.is_none() || self.last_error.is_some())
        {
            return Err("completed entry must carry a doc entry and no error".into());
        }
        if self.status == QueueStatus::RequiresReview && self.retry_count < self.max_retries {
            return Err("requires_review entry has attempts left".into());
        }
        if self.next_retry_at.is_some() && self.status != QueueStatus::Failed {
            return Err(format!("next_retry_at set on {} entry", self.status));
        }
        Ok(())
    }
}

/// The full post-transition state written by `update_status`.
///
/// Carrying every field keeps retry policy out of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: QueueStatus,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub result_doc_entry: Option<i64>,
    pub result_doc_num: Option<String>,
    pub last_error: Option<String>,
}

impl StatusUpdate {
    pub fn completed(retry_count: u32, posted: &PostedDocument) -> Self {
        Self {
            status: QueueStatus::Completed,
            retry_count,
            next_retry_at: None,
            result_doc_entry: Some(posted.doc_entry),
            result_doc_num: Some(posted.doc_num.clone()),
            last_error: None,
        }
    }

    pub fn retry_scheduled(
        retry_count: u32,
        next_retry_at: DateTime<Utc>,
        last_error: String,
    ) -> Self {
        Self {
            status: QueueStatus::Failed,
            retry_count,
            next_retry_at: Some(next_retry_at),
            result_doc_entry: None,
            result_doc_num: None,
            last_error: Some(last_error),
        }
    }

    /// Hand an unattempted claim back, restoring the state `entry` was
    /// claimed from.
    pub fn released(entry: &QueueEntry) -> Self {
        Self {
            status: entry.status,
            retry_count: entry.retry_count,
            next_retry_at: entry.next_retry_at,
            result_doc_entry: None,
            result_doc_num: None,
            last_error: entry.last_error.clone(),
        }
    }

    pub fn requires_review(retry_count: u32, last_error: String) -> Self {
        Self {
            status: QueueStatus::RequiresReview,
            retry_count,
            next_retry_at: None,
            result_doc_entry: None,
            result_doc_num: None,
            last_error: Some(last_error),
        }
    }
}

/// Transfer description carried in the queue payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPayload {
    pub from_warehouse: String,
    pub to_warehouse: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub lines: Vec<TransferLine>,
}

/// One item line; warehouse overrides default to the header warehouses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferLine {
    pub item_code: String,
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_warehouse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_warehouse: Option<String>,
}

/// Why a queue payload could not be turned into a transfer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("malformed transfer payload: {0}")]
    Malformed(String),

    #[error("invalid transfer payload: {0}")]
    Invalid(String),
}

impl TransferPayload {
    /// Parse and validate a serialized payload.
    pub fn from_json(raw: &str) -> Result<Self, PayloadError> {
        let payload: Self =
            serde_json::from_str(raw).map_err(|e| PayloadError::Malformed(e.to_string()))?;
        payload.validate()?;
        Ok(payload)
    }

    fn validate(&self) -> Result<(), PayloadError> {
        if self.from_warehouse.trim().is_empty() || self.to_warehouse.trim().is_empty() {
            return Err(PayloadError::Invalid("from/to warehouse must not be blank".into()));
        }
        if self.lines.is_empty() {
            return Err(PayloadError::Invalid("transfer has no lines".into()));
        }
        for (idx, line) in self.lines.iter().enumerate() {
            if line.item_code.trim().is_empty() {
                return Err(PayloadError::Invalid(format!("line {idx} has no item code")));
            }
            if !line.quantity.is_finite() || line.quantity <= 0.0 {
                return Err(PayloadError::Invalid(format!(
                    "line {idx} ({}) has non-positive quantity {}",
                    line.item_code, line.quantity
                )));
            }
        }
        Ok(())
    }
}
