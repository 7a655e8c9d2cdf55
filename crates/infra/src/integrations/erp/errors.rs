//! ERP error classification
//!
//! Maps Service Layer HTTP failures onto [`ErpErrorCategory`]. The posting
//! pipeline retries every category the same way; the category feeds logs and
//! the persisted `last_error` text.

use reqwest::StatusCode;
use serde::Deserialize;
use stockpost_domain::{ErpError, ErpErrorCategory, StockpostError};

/// Service Layer error envelope: `{"error": {"code": .., "message": ..}}`.
///
/// v1 wraps the message as `{"lang": .., "value": ..}`, v2 sends a bare string.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    message: ErrorMessage,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorMessage {
    Localized { value: String },
    Plain(String),
}

impl ErrorMessage {
    fn text(&self) -> &str {
        match self {
            Self::Localized { value } => value,
            Self::Plain(text) => text,
        }
    }
}

/// Classify a non-success response from the ERP.
///
/// A 400/409 carrying a Service Layer error body is the ERP refusing a
/// well-formed document (negative stock, closed period, ...), so it is a
/// business-rule rejection rather than a validation error.
pub fn classify_response(status: StatusCode, body: &str) -> ErpError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();

    let category = match status.as_u16() {
        401 | 403 => ErpErrorCategory::Authentication,
        408 | 504 => ErpErrorCategory::Timeout,
        400 | 409 if parsed.is_some() => ErpErrorCategory::BusinessRule,
        400 | 404 | 409 | 422 => ErpErrorCategory::Validation,
        429 | 500..=599 => ErpErrorCategory::Server,
        _ => ErpErrorCategory::Unknown,
    };

    let message = match parsed {
        Some(envelope) => match envelope.error.code {
            Some(code) => format!(
                "HTTP {} (ERP code {}): {}",
                status.as_u16(),
                code,
                envelope.error.message.text()
            ),
            None => format!("HTTP {}: {}", status.as_u16(), envelope.error.message.text()),
        },
        None => format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        ),
    };

    ErpError::new(category, message)
}

/// Classify a transport-level failure reported by the HTTP wrapper.
pub fn classify_transport(err: StockpostError) -> ErpError {
    match err {
        StockpostError::Network(message) if message.contains("timed out") => {
            ErpError::timeout(message)
        }
        StockpostError::Network(message) => ErpError::network(message),
        other => ErpError::new(ErpErrorCategory::Unknown, other.to_string()),
    }
}
