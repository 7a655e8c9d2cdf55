//! Queued transfer posting pipeline
//!
//! A round claims up to `batch_size` eligible entries and walks them one at a
//! time: claim (`Processing`) → build document → post to the ERP → persist
//! `Completed` or hand the failure to [`retry_policy::RetryPolicy`].

pub mod claimer;
pub mod documents;
pub mod ports;
pub mod processor;
pub mod retry_policy;
