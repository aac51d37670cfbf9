//! Proxy error types.

use cryptstore_crypto::CryptoError;
use cryptstore_keyservice::ServiceError;
use cryptstore_storage::StorageError;
use thiserror::Error;

pub type ProxyResult<T> = Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("file cannot be completely empty, it must contain at least one document")]
    EmptyDocument,

    #[error("could not wrap data key for key group {group}: {}", summarize(.failures))]
    KeyWrap { group: usize, failures: Vec<String> },

    #[error("could not recover data key for key group {group}: {}", summarize(.failures))]
    KeyRecovery { group: usize, failures: Vec<String> },

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("must provide a key")]
    MissingKey,

    #[error("error loading encrypted file: {0}")]
    Decode(String),

    #[error("error encoding encrypted file: {0}")]
    Encode(String),

    #[error("backend load error: {0}")]
    BackendLoad(#[source] StorageError),

    #[error(transparent)]
    Backend(#[from] StorageError),

    #[error("key service error: {0}")]
    KeyService(#[from] ServiceError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

fn summarize(failures: &[String]) -> String {
    match failures {
        [] => "no keys attempted".to_string(),
        [only] => only.clone(),
        many => format!("{} keys failed: [{}]", many.len(), many.join("; ")),
    }
}

/// Lets the proxy act as a [`cryptstore_storage::Storage`] itself. Backend
/// errors keep their kind so callers can still test for `NotFound`.
impl From<ProxyError> for StorageError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Backend(e) => e,
            ProxyError::BackendLoad(StorageError::NotFound(key)) => StorageError::NotFound(key),
            other => StorageError::Layer(Box::new(other)),
        }
    }
}
