//! The encrypting storage proxy.

use crate::config::StorageConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::format::PayloadFormat;
use crate::metadata::{EncryptionMetadata, FORMAT_VERSION, SealedDocument};
use crate::registry::Registry;
use crate::seal::{seal, unseal};
use async_trait::async_trait;
use chrono::Utc;
use cryptstore_crypto::{DataKey, combine_shares, split_key};
use cryptstore_keys::{KeyError, KeyGroup, WrappedKeyRecord};
use cryptstore_keyservice::{EncryptionProvider, KeyService, ServiceError};
use cryptstore_storage::{KeyInfo, Storage, StorageResult};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// A key group together with the key service that wraps for it.
struct GroupBinding {
    group: KeyGroup,
    service: Arc<dyn KeyService>,
}

/// Storage that encrypts values on `store` and decrypts them on `load`.
///
/// Everything else is delegated to the backend untouched. Key groups and
/// key services are fixed at construction and shared read-only by
/// concurrent callers.
pub struct EncryptedStorage {
    backend: Arc<dyn Storage>,
    providers: Vec<Arc<dyn EncryptionProvider>>,
    groups: Vec<GroupBinding>,
    services: Vec<Arc<dyn KeyService>>,
    format: PayloadFormat,
    cleaned_up: AtomicBool,
}

impl EncryptedStorage {
    /// Wires a backend to one or more providers.
    pub fn new(
        backend: Arc<dyn Storage>,
        providers: Vec<Arc<dyn EncryptionProvider>>,
        format: PayloadFormat,
    ) -> ProxyResult<Self> {
        if providers.is_empty() {
            return Err(ProxyError::Configuration(
                "at least one encryption provider is required".to_string(),
            ));
        }

        let mut groups = Vec::new();
        let mut services = Vec::with_capacity(providers.len());
        for provider in &providers {
            let service = provider.key_service();
            if provider.key_groups().is_empty() {
                return Err(ProxyError::Configuration(format!(
                    "provider {} has no key groups",
                    provider.name()
                )));
            }
            for group in provider.key_groups() {
                groups.push(GroupBinding {
                    group: group.clone(),
                    service: Arc::clone(&service),
                });
            }
            services.push(service);
        }

        Ok(Self {
            backend,
            providers,
            groups,
            services,
            format,
            cleaned_up: AtomicBool::new(false),
        })
    }

    /// Builds the backend and provider named in `config` through `registry`.
    pub async fn provision(config: &StorageConfig, registry: &Registry) -> ProxyResult<Self> {
        config.validate()?;

        let backend = registry.build_backend(&config.backend).await?;
        let mut providers = Vec::with_capacity(config.encryption.len());
        for entry in &config.encryption {
            providers.push(registry.build_provider(entry).await?);
        }

        let storage = Self::new(backend, providers, config.format)?;
        info!(
            backend = %config.backend.module,
            provider = %config.encryption[0].provider,
            groups = storage.groups.len(),
            payload = ?config.format,
            "encrypted storage provisioned"
        );
        Ok(storage)
    }

    pub fn backend(&self) -> &Arc<dyn Storage> {
        &self.backend
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Number of key groups every new data key is wrapped for.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Encrypts `plaintext` and writes it to the backend under `key`.
    pub async fn store(&self, key: &str, plaintext: &[u8]) -> ProxyResult<()> {
        let document = self.format.parse(plaintext)?;
        if document.is_empty() {
            return Err(ProxyError::EmptyDocument);
        }

        let data_key = DataKey::generate();
        let key_groups = self.wrap(&data_key).await?;

        let last_modified = Utc::now();
        let (branches, mac) = seal(&document, &data_key, &last_modified)?;
        let sealed = SealedDocument {
            branches,
            metadata: EncryptionMetadata {
                key_groups,
                last_modified,
                mac,
                version: FORMAT_VERSION.to_string(),
            },
        };
        let bytes = sealed.to_bytes()?;

        debug!(key = %key, plaintext = plaintext.len(), sealed = bytes.len(), "storing encrypted value");
        self.backend.store(key, &bytes).await?;
        Ok(())
    }

    /// Reads `key` from the backend and returns the verified plaintext.
    pub async fn load(&self, key: &str) -> ProxyResult<Vec<u8>> {
        let raw = self
            .backend
            .load(key)
            .await
            .map_err(ProxyError::BackendLoad)?;
        let sealed = SealedDocument::from_bytes(&raw)?;

        let data_key = self.recover(&sealed.metadata).await?;
        let document = unseal(
            &sealed.branches,
            &data_key,
            &sealed.metadata.mac,
            &sealed.metadata.last_modified,
        )?;

        let plaintext = self.format.emit(&document)?;
        debug!(key = %key, sealed = raw.len(), plaintext = plaintext.len(), "loaded encrypted value");
        Ok(plaintext)
    }

    /// Runs every provider's cleanup once. Later calls do nothing.
    pub async fn cleanup(&self) -> ProxyResult<()> {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut first_error = None;
        for provider in &self.providers {
            if let Err(e) = provider.cleanup().await {
                warn!(provider = provider.name(), error = %e, "provider cleanup failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Wraps one share of `data_key` per group with every key of that group.
    async fn wrap(&self, data_key: &DataKey) -> ProxyResult<Vec<Vec<WrappedKeyRecord>>> {
        let shares = split_key(data_key, self.groups.len())?;
        let mut wrapped = Vec::with_capacity(self.groups.len());

        for (index, (binding, share)) in self.groups.iter().zip(&shares).enumerate() {
            let attempts = binding.group.iter().map(|key| {
                let descriptor = key.descriptor();
                let service = Arc::clone(&binding.service);
                async move {
                    let result = service.encrypt(&descriptor, share.as_bytes()).await;
                    (descriptor, result)
                }
            });

            let mut records = Vec::with_capacity(binding.group.len());
            let mut failures = Vec::new();
            for (descriptor, result) in join_all(attempts).await {
                match result {
                    Ok(enc) => records.push(
                        WrappedKeyRecord::new(&descriptor, enc)
                            .map_err(|e| ProxyError::Encode(e.to_string()))?,
                    ),
                    Err(e) => {
                        warn!(group = index, key = %descriptor, error = %e, "failed to wrap data key");
                        failures.push(describe(&descriptor.to_string(), &e));
                    }
                }
            }

            if records.is_empty() {
                return Err(ProxyError::KeyWrap {
                    group: index,
                    failures,
                });
            }
            wrapped.push(records);
        }
        Ok(wrapped)
    }

    /// Recovers every group's share (AND) from any of its records (OR).
    async fn recover(&self, metadata: &EncryptionMetadata) -> ProxyResult<DataKey> {
        let mut shares = Vec::with_capacity(metadata.key_groups.len());
        for (index, records) in metadata.key_groups.iter().enumerate() {
            shares.push(self.recover_share(index, records).await?);
        }
        Ok(combine_shares(&shares)?)
    }

    async fn recover_share(&self, group: usize, records: &[WrappedKeyRecord]) -> ProxyResult<DataKey> {
        let mut errors: Vec<ServiceError> = Vec::new();
        for record in records {
            for service in &self.services {
                match service.decrypt(record).await {
                    Ok(bytes) => match DataKey::from_slice(&bytes) {
                        Ok(share) => return Ok(share),
                        Err(e) => errors.push(ServiceError::Protocol(e.to_string())),
                    },
                    Err(e) => {
                        let terminal = e.is_terminal();
                        warn!(group, key_type = ?record.key_type, error = %e, "failed to unwrap data key");
                        errors.push(e);
                        if terminal {
                            break;
                        }
                    }
                }
            }
        }
        Err(recovery_error(group, errors))
    }
}

/// Prefixes the key identity unless the error already carries it.
fn describe(key: &str, err: &ServiceError) -> String {
    match err {
        ServiceError::Key(KeyError::Encrypt { .. } | KeyError::Decrypt { .. })
        | ServiceError::Recovery { .. } => err.to_string(),
        _ => format!("{key}: {err}"),
    }
}

/// Maps a group's failures to one error, surfacing terminal tag problems
/// when they are the only reason.
fn recovery_error(group: usize, errors: Vec<ServiceError>) -> ProxyError {
    if !errors.is_empty()
        && errors
            .iter()
            .all(|e| matches!(e, ServiceError::Key(KeyError::MissingKey)))
    {
        return ProxyError::MissingKey;
    }
    if let Some(ServiceError::Key(KeyError::UnsupportedKeyType(tag))) = errors.first()
        && errors
            .iter()
            .all(|e| matches!(e, ServiceError::Key(KeyError::UnsupportedKeyType(_))))
    {
        return ProxyError::UnsupportedKeyType(tag.clone());
    }
    ProxyError::KeyRecovery {
        group,
        failures: errors.iter().map(ToString::to_string).collect(),
    }
}

impl fmt::Debug for EncryptedStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedStorage")
            .field("backend", &self.backend)
            .field("providers", &self.providers)
            .field("groups", &self.groups.len())
            .field("format", &self.format)
            .finish()
    }
}

#[async_trait]
impl Storage for EncryptedStorage {
    async fn store(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        Ok(EncryptedStorage::store(self, key, value).await?)
    }

    async fn load(&self, key: &str) -> StorageResult<Vec<u8>> {
        Ok(EncryptedStorage::load(self, key).await?)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.backend.delete(key).await
    }

    async fn exists(&self, key: &str) -> bool {
        self.backend.exists(key).await
    }

    async fn list(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<String>> {
        self.backend.list(prefix, recursive).await
    }

    async fn stat(&self, key: &str) -> StorageResult<KeyInfo> {
        self.backend.stat(key).await
    }

    async fn lock(&self, name: &str) -> StorageResult<()> {
        self.backend.lock(name).await
    }

    async fn unlock(&self, name: &str) -> StorageResult<()> {
        self.backend.unlock(name).await
    }
}
