//! ERP integration (Service Layer)

pub mod client;
pub mod errors;

pub use client::ServiceLayerClient;
pub use errors::{classify_response, classify_transport};
