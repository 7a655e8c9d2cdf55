//! Domain types and models

pub mod erp;
pub mod transfer_queue;

pub use erp::{ErpError, ErpErrorCategory, ErpTransferDocument, ErpTransferLine, PostedDocument};
pub use transfer_queue::{
    DocumentKind, PayloadError, QueueEntry, QueueStatus, StatusUpdate, TransferLine,
    TransferPayload,
};
