use errly_client::ClientError;
use errly_core::ErrlyError;
use thiserror::Error;

/// Failure of the explicit initialization call.
///
/// Nothing raised while capturing or delivering an exception is ever
/// returned to the application; only setup mistakes end up here.
#[derive(Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ErrlyError),

    #[error("Failed to build delivery client: {0}")]
    Client(#[from] ClientError),
}

impl InitError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Config(ErrlyError::configuration(message))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(e) if e.is_configuration())
    }
}
