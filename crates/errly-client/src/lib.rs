//! Delivery side of the Errly SDK
//!
//! Parsed exceptions are projected into [`IngestEvent`]s and posted to the
//! ingestion service by a [`DeliveryClient`]. Delivery failures are logged
//! and swallowed: they never reach the code whose failure is being reported.

pub mod client;
pub mod error;
pub mod model;
pub mod subscriber;

pub use client::{DeliveryClient, HttpClient, CLIENT_USER_AGENT, INGEST_PATH};
pub use error::ClientError;
pub use model::{
    render_stack_trace, ErrorLevel, IngestErrorBody, IngestEvent, IngestRequest, IngestResponse,
};
pub use subscriber::{delivery_subscriber, EventDefaults};
