//! axum integration for the Errly SDK
//!
//! ```ignore
//! let integration = Arc::new(AxumIntegration::new());
//! let app = integration.attach(Router::new().route("/", get(handler)));
//! ```
//!
//! A panic that unwinds out of a handler is reported with the request method
//! and URL, then resumed so the outer layers (typically
//! `tower_http::catch_panic`) build the error response.

mod integration;
mod middleware;

pub use integration::AxumIntegration;
pub use middleware::{capture_panics, HookSlot};
