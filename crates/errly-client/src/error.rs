use errly_core::ErrlyError;
use thiserror::Error;

/// Failures of a single delivery attempt
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Ingestion service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Ingestion service rejected the API key")]
    Unauthorized,

    #[error("Rate limited by ingestion service (reset: {reset:?})")]
    RateLimited { reset: Option<i64> },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to encode request: {0}")]
    Encode(#[from] ErrlyError),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Delivery runtime error: {0}")]
    Runtime(String),
}

impl ClientError {
    /// True for failures caused by the network rather than the request
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
