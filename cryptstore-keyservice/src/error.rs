//! Key service error types.

use cryptstore_keys::KeyError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Every candidate for a wrapped record failed.
    #[error("cannot recover data key with {key}: {}", .failures.join("; "))]
    Recovery { key: String, failures: Vec<String> },

    #[error("key service connection is closed")]
    Closed,

    #[error("key service returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("key service transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("key service protocol error: {0}")]
    Protocol(String),

    #[error("invalid provider configuration: {0}")]
    Config(String),
}

impl ServiceError {
    /// True when retrying, or trying another key, cannot help.
    pub fn is_terminal(&self) -> bool {
        match self {
            ServiceError::Key(e) => e.is_terminal(),
            ServiceError::Closed | ServiceError::Config(_) => true,
            _ => false,
        }
    }
}
