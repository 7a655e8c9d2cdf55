//! ERP-facing document types
//!
//! These are the shapes the pipeline hands to an ERP client. Wire encoding
//! belongs to the client implementation.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::transfer_queue::DocumentKind;
use crate::errors::StockpostError;

/// Transfer document ready for posting, with line warehouses resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErpTransferDocument {
    pub kind: DocumentKind,
    /// External reference of the originating queue entry.
    pub reference: String,
    pub from_warehouse: String,
    pub to_warehouse: String,
    pub doc_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub comments: Option<String>,
    pub lines: Vec<ErpTransferLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErpTransferLine {
    pub line_num: u32,
    pub item_code: String,
    pub quantity: f64,
    pub from_warehouse_code: String,
    pub warehouse_code: String,
}

/// Identifiers the ERP system assigns to a posted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedDocument {
    pub doc_entry: i64,
    pub doc_num: String,
}

/// ERP error category
///
/// Informative only: the posting pipeline retries every category the same
/// way. Categories drive log fields and operator messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErpErrorCategory {
    /// Connection refused, DNS failure, reset
    Network,
    /// Request exceeded its deadline
    Timeout,
    /// 5xx responses
    Server,
    /// 401/403 or login rejected
    Authentication,
    /// Malformed request rejected by the ERP (400/404/422)
    Validation,
    /// Well-formed request refused by ERP business rules (e.g. insufficient stock)
    BusinessRule,
    Unknown,
}

impl ErpErrorCategory {
    /// Whether a later attempt has a realistic chance of succeeding unchanged.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Server | Self::Authentication)
    }
}

impl fmt::Display for ErpErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "Network Error"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Server => write!(f, "Server Unavailable"),
            Self::Authentication => write!(f, "Authentication Failed"),
            Self::Validation => write!(f, "Validation Error"),
            Self::BusinessRule => write!(f, "Business Rule Rejection"),
            Self::Unknown => write!(f, "Unknown Error"),
        }
    }
}

/// Failure returned by an ERP posting call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category}: {message}")]
pub struct ErpError {
    pub category: ErpErrorCategory,
    pub message: String,
}

impl ErpError {
    pub fn new(category: ErpErrorCategory, message: impl Into<String>) -> Self {
        Self { category, message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErpErrorCategory::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErpErrorCategory::Timeout, message)
    }

    pub fn business_rule(message: impl Into<String>) -> Self {
        Self::new(ErpErrorCategory::BusinessRule, message)
    }
}

impl From<ErpError> for StockpostError {
    fn from(err: ErpError) -> Self {
        StockpostError::Erp(err.to_string())
    }
}
