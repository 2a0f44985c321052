//! Common error types used across all Errly crates
//!
//! Only [`ErrlyError::Configuration`] is ever allowed to reach application
//! code, and only from the explicit initialization call. Every other failure
//! raised while capturing or delivering an exception is recovered where it
//! happens and reported through `tracing`.

use thiserror::Error;

use crate::integration::IntegrationKind;

/// Common SDK error types
#[derive(Error, Debug)]
pub enum ErrlyError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Integration '{kind}' could not be installed: {message}")]
    Integration {
        kind: IntegrationKind,
        message: String,
    },
}

impl ErrlyError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn integration(kind: IntegrationKind, message: impl Into<String>) -> Self {
        Self::Integration {
            kind,
            message: message.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

/// Result type alias for SDK operations
pub type ErrlyResult<T> = Result<T, ErrlyError>;
