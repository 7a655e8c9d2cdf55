//! ERP client doubles

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use stockpost_core::ErpTransferClient;
use stockpost_domain::{DocumentKind, ErpError, ErpTransferDocument, PostedDocument};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

/// One recorded ERP invocation.
#[derive(Debug, Clone)]
pub struct ErpCall {
    pub operation: DocumentKind,
    pub document: ErpTransferDocument,
}

/// Replays queued responses in order; fails with a network error once empty.
#[derive(Default)]
pub struct ScriptedErpClient {
    responses: Mutex<VecDeque<Result<PostedDocument, ErpError>>>,
    calls: Mutex<Vec<ErpCall>>,
}

impl ScriptedErpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_success(&self, doc_entry: i64, doc_num: &str) {
        self.responses
            .lock()
            .await
            .push_back(Ok(PostedDocument { doc_entry, doc_num: doc_num.to_string() }));
    }

    pub async fn push_failure(&self, error: ErpError) {
        self.responses.lock().await.push_back(Err(error));
    }

    pub async fn calls(&self) -> Vec<ErpCall> {
        self.calls.lock().await.clone()
    }

    async fn respond(
        &self,
        operation: DocumentKind,
        document: &ErpTransferDocument,
    ) -> Result<PostedDocument, ErpError> {
        self.calls.lock().await.push(ErpCall { operation, document: document.clone() });
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(ErpError::network("no scripted response")))
    }
}

#[async_trait]
impl ErpTransferClient for ScriptedErpClient {
    async fn post_transfer_request(
        &self,
        document: &ErpTransferDocument,
        _cancel: &CancellationToken,
    ) -> Result<PostedDocument, ErpError> {
        self.respond(DocumentKind::Request, document).await
    }

    async fn post_direct_transfer(
        &self,
        document: &ErpTransferDocument,
        _cancel: &CancellationToken,
    ) -> Result<PostedDocument, ErpError> {
        self.respond(DocumentKind::Direct, document).await
    }
}

/// Holds every call until [`release`](Self::release) is called.
#[derive(Default)]
pub struct BlockingErpClient {
    entered: Notify,
    release: Notify,
    calls: AtomicUsize,
}

impl BlockingErpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once a call is parked inside the client.
    pub async fn wait_until_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_waiters();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn block(&self) -> Result<PostedDocument, ErpError> {
        let released = self.release.notified();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        released.await;
        Ok(PostedDocument { doc_entry: 1, doc_num: "BLOCKED-1".into() })
    }
}

#[async_trait]
impl ErpTransferClient for BlockingErpClient {
    async fn post_transfer_request(
        &self,
        _document: &ErpTransferDocument,
        _cancel: &CancellationToken,
    ) -> Result<PostedDocument, ErpError> {
        self.block().await
    }

    async fn post_direct_transfer(
        &self,
        _document: &ErpTransferDocument,
        _cancel: &CancellationToken,
    ) -> Result<PostedDocument, ErpError> {
        self.block().await
    }
}
