//! Errly error-reporting SDK
//!
//! ```ignore
//! let controller = errly::Errly::init(errly::ErrlyConfig::from_env()?)?;
//! // ... run the application ...
//! controller.revert();
//! ```
//!
//! Panics anywhere in the process are captured by the panic hook
//! integration. With the `axum` feature, routers passed through
//! `controller.axum()` also report handler panics with request context.
//! Captured exceptions are posted to `{base_url}/api/v1/ingest`; delivery
//! failures are logged and never surface in the application.

pub mod config;
pub mod controller;
pub mod error;
pub mod telemetry;

pub use config::ErrlyConfig;
pub use controller::{Errly, ErrlyBuilder, ModuleController, UninitializedModuleController};
pub use error::InitError;

pub use errly_client::{DeliveryClient, HttpClient, IngestEvent, IngestRequest};
pub use errly_core::{
    ExceptionParsed, Integration, IntegrationInitialized, IntegrationKind, LifecycleState,
    StructuredException,
};
pub use errly_panic::PanicHookIntegration;

#[cfg(feature = "axum")]
pub use errly_axum::AxumIntegration;

pub use errly_client;
pub use errly_core;
