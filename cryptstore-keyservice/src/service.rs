use crate::error::ServiceResult;
use async_trait::async_trait;
use cryptstore_keys::{KeyDescriptor, WrappedKeyRecord};

/// Wraps data keys for a target master key and unwraps stored records.
#[async_trait]
pub trait KeyService: Send + Sync {
    /// Wraps `data_key` with the master key described by `key`.
    async fn encrypt(&self, key: &KeyDescriptor, data_key: &[u8]) -> ServiceResult<Vec<u8>>;

    /// Recovers the data key held in `record`.
    async fn decrypt(&self, record: &WrappedKeyRecord) -> ServiceResult<Vec<u8>>;
}
