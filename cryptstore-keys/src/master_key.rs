//! The master key capability.

use crate::age::AgeKey;
use crate::aws_kms::AwsKmsKey;
use crate::azure_kv::AzureKvKey;
use crate::descriptor::{KeyDescriptor, KeyKind};
use crate::error::KeyResult;
use crate::gcp_kms::GcpKmsKey;
use crate::hc_vault::HcVaultKey;
use crate::pgp::PgpKey;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Wraps and unwraps data keys. Implementations never see document data.
#[async_trait]
pub trait MasterKey: Send + Sync + fmt::Debug {
    /// The immutable description recorded next to every wrapped key.
    fn descriptor(&self) -> KeyDescriptor;

    fn kind(&self) -> KeyKind {
        self.descriptor().kind()
    }

    /// Wraps `data_key`, returning opaque ciphertext.
    async fn encrypt(&self, data_key: &[u8]) -> KeyResult<Vec<u8>>;

    /// Unwraps ciphertext produced by [`MasterKey::encrypt`].
    async fn decrypt(&self, wrapped: &[u8]) -> KeyResult<Vec<u8>>;
}

/// Builds an ephemeral key from a descriptor alone.
///
/// The result carries no local secrets: age keys built this way can wrap
/// but not unwrap, and cloud keys resolve credentials from the environment.
pub fn from_descriptor(descriptor: &KeyDescriptor) -> KeyResult<Arc<dyn MasterKey>> {
    let key: Arc<dyn MasterKey> = match descriptor {
        KeyDescriptor::Age { recipient } => Arc::new(AgeKey::recipient_only(recipient)?),
        KeyDescriptor::GcpKms { resource_id } => Arc::new(GcpKmsKey::new(resource_id, None, None)?),
        KeyDescriptor::AwsKms {
            arn,
            role,
            context,
            profile,
        } => Arc::new(AwsKmsKey::new(
            arn,
            role.clone(),
            context.clone(),
            profile.clone(),
        )?),
        KeyDescriptor::AzureKv {
            vault_url,
            name,
            version,
        } => Arc::new(AzureKvKey::new(vault_url, name, version, None)?),
        KeyDescriptor::HcVault {
            vault_address,
            engine_path,
            key_name,
        } => Arc::new(HcVaultKey::new(vault_address, engine_path, key_name, None)?),
        KeyDescriptor::Pgp { fingerprint } => Arc::new(PgpKey::new(fingerprint, None)?),
    };
    Ok(key)
}
