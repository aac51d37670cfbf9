//! In-process key service with type-directed unwrap dispatch.
//!
//! Records of deterministic types (`aws_kms`, `azure_kv`, `hc_vault`,
//! `pgp`) fully describe their master key, so one key is rebuilt from the
//! record and tried once. Records of scanned types (`age`, `gcp_kms`) do not
//! identify which local instance produced them, so every configured key of
//! that type is tried until one succeeds.

use crate::error::{ServiceError, ServiceResult};
use crate::service::KeyService;
use async_trait::async_trait;
use cryptstore_keys::{
    KeyDescriptor, KeyGroup, KeyKind, MasterKey, WrappedKeyRecord, from_descriptor,
};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct LocalKeyService {
    keys: Vec<Arc<dyn MasterKey>>,
}

impl LocalKeyService {
    pub fn new(keys: Vec<Arc<dyn MasterKey>>) -> Self {
        Self { keys }
    }

    pub fn from_groups(groups: &[KeyGroup]) -> Self {
        Self::new(
            groups
                .iter()
                .flat_map(|g| g.keys().iter().cloned())
                .collect(),
        )
    }

    /// The locally configured key with exactly this descriptor, if any.
    fn configured(&self, descriptor: &KeyDescriptor) -> Option<&Arc<dyn MasterKey>> {
        self.keys.iter().find(|k| &k.descriptor() == descriptor)
    }

    /// Resolves the key for a descriptor: the configured instance (which may
    /// carry credentials) or an ephemeral one built from the descriptor.
    fn resolve(&self, descriptor: &KeyDescriptor) -> ServiceResult<Arc<dyn MasterKey>> {
        match self.configured(descriptor) {
            Some(key) => Ok(Arc::clone(key)),
            None => Ok(from_descriptor(descriptor)?),
        }
    }

    /// Configured keys of `kind`, those matching the record's descriptor first.
    fn candidates(&self, kind: KeyKind, hint: Option<&KeyDescriptor>) -> Vec<Arc<dyn MasterKey>> {
        let (mut matching, rest): (Vec<_>, Vec<_>) = self
            .keys
            .iter()
            .filter(|k| k.kind() == kind)
            .cloned()
            .partition(|k| hint.is_some_and(|d| &k.descriptor() == d));
        matching.extend(rest);
        matching
    }

    async fn scan(&self, kind: KeyKind, record: &WrappedKeyRecord) -> ServiceResult<Vec<u8>> {
        let hint = record.descriptor().ok();
        let candidates = self.candidates(kind, hint.as_ref());
        let label = hint
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| kind.to_string());

        if candidates.is_empty() {
            return Err(ServiceError::Recovery {
                key: label,
                failures: vec![format!("no {kind} keys are configured locally")],
            });
        }

        let mut failures = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            match candidate.decrypt(&record.enc).await {
                Ok(data_key) => {
                    debug!(key = %candidate.descriptor(), "data key recovered");
                    return Ok(data_key);
                }
                Err(e) => failures.push(e.to_string()),
            }
        }
        Err(ServiceError::Recovery {
            key: label,
            failures,
        })
    }

    async fn direct(&self, record: &WrappedKeyRecord) -> ServiceResult<Vec<u8>> {
        let descriptor = record.descriptor()?;
        let key = self.resolve(&descriptor)?;
        key.decrypt(&record.enc)
            .await
            .map_err(|e| ServiceError::Recovery {
                key: descriptor.to_string(),
                failures: vec![e.to_string()],
            })
    }
}

#[async_trait]
impl KeyService for LocalKeyService {
    async fn encrypt(&self, key: &KeyDescriptor, data_key: &[u8]) -> ServiceResult<Vec<u8>> {
        let master = self.resolve(key)?;
        master.encrypt(data_key).await.map_err(|e| {
            warn!(key = %key, error = %e, "failed to wrap data key");
            ServiceError::from(e)
        })
    }

    async fn decrypt(&self, record: &WrappedKeyRecord) -> ServiceResult<Vec<u8>> {
        let kind = record.kind()?;
        if kind.requires_scan() {
            self.scan(kind, record).await
        } else {
            self.direct(record).await
        }
    }
}
