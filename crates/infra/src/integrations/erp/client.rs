//! Service Layer client for posting inventory transfers
//!
//! Session flow: `POST /Login` yields a `SessionId` that is sent back as the
//! `B1SESSION` cookie. The session is cached and re-established once when a
//! document post comes back 401; a 401 means the document was not created,
//! so repeating the post is safe. Document posts are never retried on any
//! other outcome.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::COOKIE;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use stockpost_core::ErpTransferClient;
use stockpost_domain::{
    DocumentKind, ErpConfig, ErpError, ErpErrorCategory, ErpTransferDocument, PostedDocument,
    Result,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::errors::{classify_response, classify_transport};
use crate::http::HttpClient;

const LOGIN_PATH: &str = "Login";
const STOCK_TRANSFERS_PATH: &str = "StockTransfers";
const TRANSFER_REQUESTS_PATH: &str = "InventoryTransferRequests";

/// Inventory transfer client for a Service Layer endpoint.
pub struct ServiceLayerClient {
    base_url: String,
    company_db: String,
    username: String,
    password: String,
    http: HttpClient,
    session: Mutex<Option<String>>,
}

impl ServiceLayerClient {
    pub fn new(config: &ErpConfig) -> Result<Self> {
        let http = HttpClient::for_erp(config)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            company_db: config.company_db.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            http,
            session: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Current session id, logging in if there is none.
    async fn session_id(&self) -> std::result::Result<String, ErpError> {
        let mut session = self.session.lock().await;
        if let Some(id) = session.as_ref() {
            return Ok(id.clone());
        }

        let id = self.login().await?;
        *session = Some(id.clone());
        Ok(id)
    }

    /// Forget `stale` unless another caller already replaced it.
    async fn invalidate_session(&self, stale: &str) {
        let mut session = self.session.lock().await;
        if session.as_deref() == Some(stale) {
            *session = None;
        }
    }

    #[instrument(skip(self), fields(company_db = %self.company_db))]
    async fn login(&self) -> std::result::Result<String, ErpError> {
        let body = LoginRequest {
            company_db: &self.company_db,
            user_name: &self.username,
            password: &self.password,
        };

        let response = self
            .http
            .send_login(self.http.request(Method::POST, self.endpoint(LOGIN_PATH)).json(&body))
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let mut err = classify_response(status, &text);
            if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
                err.category = ErpErrorCategory::Authentication;
            }
            warn!(status = status.as_u16(), error = %err, "ERP login failed");
            return Err(err);
        }

        let login: LoginResponse = response.json().await.map_err(|e| {
            ErpError::new(ErpErrorCategory::Unknown, format!("unreadable login response: {e}"))
        })?;

        info!("ERP session established");
        Ok(login.session_id)
    }

    async fn post_document(
        &self,
        document: &ErpTransferDocument,
    ) -> std::result::Result<PostedDocument, ErpError> {
        let path = match document.kind {
            DocumentKind::Direct => STOCK_TRANSFERS_PATH,
            DocumentKind::Request => TRANSFER_REQUESTS_PATH,
        };
        let body = TransferBody::from(document);

        let mut relogged = false;
        loop {
            let session = self.session_id().await?;
            let request = self
                .http
                .request(Method::POST, self.endpoint(path))
                .header(COOKIE, format!("B1SESSION={session}"))
                .json(&body);

            let response = self.http.send_once(request).await.map_err(classify_transport)?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !relogged {
                warn!(reference = %document.reference, "ERP session rejected; logging in again");
                self.invalidate_session(&session).await;
                relogged = true;
                continue;
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(classify_response(status, &text));
            }

            let created: CreatedDocument = response.json().await.map_err(|e| {
                ErpError::new(
                    ErpErrorCategory::Unknown,
                    format!("document created but response unreadable: {e}"),
                )
            })?;

            debug!(
                reference = %document.reference,
                path,
                doc_entry = created.doc_entry,
                "ERP document created"
            );

            return Ok(PostedDocument {
                doc_entry: created.doc_entry,
                doc_num: created.doc_num.into_string(),
            });
        }
    }

    async fn post_cancellable(
        &self,
        document: &ErpTransferDocument,
        cancel: &CancellationToken,
    ) -> std::result::Result<PostedDocument, ErpError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(ErpError::new(ErpErrorCategory::Unknown, "ERP request cancelled"))
            }
            result = self.post_document(document) => result,
        }
    }
}

#[async_trait]
impl ErpTransferClient for ServiceLayerClient {
    async fn post_transfer_request(
        &self,
        document: &ErpTransferDocument,
        cancel: &CancellationToken,
    ) -> std::result::Result<PostedDocument, ErpError> {
        self.post_cancellable(document, cancel).await
    }

    async fn post_direct_transfer(
        &self,
        document: &ErpTransferDocument,
        cancel: &CancellationToken,
    ) -> std::result::Result<PostedDocument, ErpError> {
        self.post_cancellable(document, cancel).await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct LoginRequest<'a> {
    #[serde(rename = "CompanyDB")]
    company_db: &'a str,
    user_name: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LoginResponse {
    session_id: String,
}

/// Shared body of `StockTransfers` and `InventoryTransferRequests`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TransferBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    doc_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<NaiveDate>,
    from_warehouse: &'a str,
    to_warehouse: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    comments: Option<&'a str>,
    reference2: &'a str,
    stock_transfer_lines: Vec<TransferLineBody<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TransferLineBody<'a> {
    line_num: u32,
    item_code: &'a str,
    quantity: f64,
    from_warehouse_code: &'a str,
    warehouse_code: &'a str,
}

impl<'a> From<&'a ErpTransferDocument> for TransferBody<'a> {
    fn from(doc: &'a ErpTransferDocument) -> Self {
        Self {
            doc_date: doc.doc_date,
            due_date: doc.due_date,
            from_warehouse: &doc.from_warehouse,
            to_warehouse: &doc.to_warehouse,
            comments: doc.comments.as_deref(),
            reference2: &doc.reference,
            stock_transfer_lines: doc
                .lines
                .iter()
                .map(|line| TransferLineBody {
                    line_num: line.line_num,
                    item_code: &line.item_code,
                    quantity: line.quantity,
                    from_warehouse_code: &line.from_warehouse_code,
                    warehouse_code: &line.warehouse_code,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatedDocument {
    doc_entry: i64,
    doc_num: DocNum,
}

/// `DocNum` is numeric in Service Layer responses but kept as text here.
#[derive(Deserialize)]
#[serde(untagged)]
enum DocNum {
    Number(i64),
    Text(String),
}

impl DocNum {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}
