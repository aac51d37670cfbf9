//! Key error types.

use thiserror::Error;

/// Result type for master key operations.
pub type KeyResult<T> = Result<T, KeyError>;

/// Errors raised while configuring or using master keys.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid key configuration: {0}")]
    Config(String),

    #[error("{key}: failed to wrap data key: {reason}")]
    Encrypt { key: String, reason: String },

    #[error("{key}: failed to unwrap data key: {reason}")]
    Decrypt { key: String, reason: String },

    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("must provide a key")]
    MissingKey,

    #[error("invalid key descriptor: {0}")]
    InvalidDescriptor(String),
}

impl KeyError {
    /// True for data/config mismatches that no retry or other candidate can fix.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            KeyError::UnsupportedKeyType(_) | KeyError::MissingKey | KeyError::InvalidDescriptor(_)
        )
    }
}
