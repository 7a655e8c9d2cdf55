//! Shared test helpers for `stockpost-core` integration tests.
//!
//! In-memory doubles for the queue store and ERP client plus payload
//! fixtures, so pipeline tests can focus on transitions instead of wiring.

#![allow(dead_code)]

pub mod erp;
pub mod store;

use chrono::{DateTime, TimeZone, Utc};
use stockpost_domain::QueueEntry;

pub use erp::{BlockingErpClient, ErpCall, ScriptedErpClient};
pub use store::InMemoryQueueStore;

/// Fixed starting instant for deterministic clocks.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 12, 9, 0, 0).unwrap()
}

/// A well-formed two-line transfer payload.
pub fn valid_payload_json() -> String {
    serde_json::json!({
        "fromWarehouse": "01",
        "toWarehouse": "02",
        "docDate": "2025-05-12",
        "comments": "replenish front store",
        "lines": [
            { "itemCode": "SKU-1", "quantity": 3.0 },
            { "itemCode": "SKU-2", "quantity": 1.0, "toWarehouse": "05" }
        ]
    })
    .to_string()
}

/// A pending entry created at `t0()` with a valid payload.
pub fn pending_entry(reference: &str, is_transfer_request: bool, max_retries: u32) -> QueueEntry {
    QueueEntry::new(reference, valid_payload_json(), is_transfer_request, max_retries, t0())
}
