//! Shared fixtures for the proxy integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use cryptstore::{
    EncryptedStorage, EncryptionProvider, KeyDescriptor, KeyGroup, KeyInfo, LocalProvider,
    MasterKey, PayloadFormat, SealedDocument, Storage,
};
use cryptstore_crypto::serde_b64;
use cryptstore_keys::age::{AgeConfig, AgeKey};
use cryptstore_keys::{KeyError, KeyResult};
use cryptstore_storage::{MemoryStorage, StorageResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A freshly generated age key pair in text form.
pub struct AgePair {
    pub recipient: String,
    pub identity: String,
}

impl AgePair {
    pub fn generate() -> Self {
        let (recipient, identity) = AgeKey::generate();
        Self {
            recipient,
            identity,
        }
    }

    /// Key able to wrap and unwrap, configured with both halves.
    pub fn full(&self) -> Arc<dyn MasterKey> {
        let config = AgeConfig {
            recipient: Some(self.recipient.clone()),
            identities: vec![self.identity.clone()],
        };
        Arc::new(config.build().unwrap())
    }

    /// Key that can only wrap.
    pub fn wrap_only(&self) -> Arc<dyn MasterKey> {
        Arc::new(AgeKey::recipient_only(&self.recipient).unwrap())
    }
}

pub fn group(keys: Vec<Arc<dyn MasterKey>>) -> KeyGroup {
    KeyGroup::new(keys).unwrap()
}

pub fn local(groups: Vec<KeyGroup>) -> Arc<dyn EncryptionProvider> {
    Arc::new(LocalProvider::new(groups))
}

pub fn proxy(backend: Arc<dyn Storage>, groups: Vec<KeyGroup>) -> EncryptedStorage {
    EncryptedStorage::new(backend, vec![local(groups)], PayloadFormat::Binary).unwrap()
}

/// Master key that refuses to wrap or unwrap anything.
#[derive(Debug)]
pub struct BrokenKey;

#[async_trait]
impl MasterKey for BrokenKey {
    fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor::Pgp {
            fingerprint: "85D77543B3D624B63CEA9E6DBC17301B491B3F21".into(),
        }
    }

    async fn encrypt(&self, _data_key: &[u8]) -> KeyResult<Vec<u8>> {
        Err(KeyError::Encrypt {
            key: self.descriptor().to_string(),
            reason: "keyring unavailable".into(),
        })
    }

    async fn decrypt(&self, _wrapped: &[u8]) -> KeyResult<Vec<u8>> {
        Err(KeyError::Decrypt {
            key: self.descriptor().to_string(),
            reason: "keyring unavailable".into(),
        })
    }
}

/// Memory backend that counts writes.
#[derive(Debug, Default)]
pub struct CountingStorage {
    pub inner: MemoryStorage,
    stores: AtomicUsize,
}

impl CountingStorage {
    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for CountingStorage {
    async fn store(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store(key, value).await
    }

    async fn load(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.inner.load(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> bool {
        self.inner.exists(key).await
    }

    async fn list(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<String>> {
        self.inner.list(prefix, recursive).await
    }

    async fn stat(&self, key: &str) -> StorageResult<KeyInfo> {
        self.inner.stat(key).await
    }

    async fn lock(&self, name: &str) -> StorageResult<()> {
        self.inner.lock(name).await
    }

    async fn unlock(&self, name: &str) -> StorageResult<()> {
        self.inner.unlock(name).await
    }
}

/// Reads the sealed document stored under `key`.
pub async fn sealed(backend: &dyn Storage, key: &str) -> SealedDocument {
    SealedDocument::from_bytes(&backend.load(key).await.unwrap()).unwrap()
}

/// Writes `document` back under `key`.
pub async fn reseal(backend: &dyn Storage, key: &str, document: &SealedDocument) {
    backend.store(key, &document.to_bytes().unwrap()).await.unwrap();
}

/// Flips the lowest bit of the first byte of `field` (`data` or `iv`) in an
/// `ENC[...]` string.
pub fn flip(enc: &str, field: &str) -> String {
    let marker = format!("{field}:");
    let start = enc.find(&marker).unwrap() + marker.len();
    let end = start + enc[start..].find(',').unwrap();
    let mut bytes = serde_b64::decode(&enc[start..end]).unwrap();
    bytes[0] ^= 1;
    format!("{}{}{}", &enc[..start], serde_b64::encode(&bytes), &enc[end..])
}
