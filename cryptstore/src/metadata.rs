//! Encryption metadata and the persisted sealed-document layout.

use crate::error::{ProxyError, ProxyResult};
use chrono::{DateTime, Utc};
use cryptstore_keys::WrappedKeyRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version written into every sealed document. Loads accept any version
/// with the same major component.
pub const FORMAT_VERSION: &str = "1.0";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    /// One list of wrapped records per key group.
    pub key_groups: Vec<Vec<WrappedKeyRecord>>,
    pub last_modified: DateTime<Utc>,
    /// Encrypted digest of the plaintext leaves.
    pub mac: String,
    pub version: String,
}

impl EncryptionMetadata {
    pub fn check(&self) -> ProxyResult<()> {
        if major(&self.version) != major(FORMAT_VERSION) {
            return Err(ProxyError::Decode(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                self.version
            )));
        }
        if self.key_groups.is_empty() {
            return Err(ProxyError::Decode("metadata lists no key groups".to_string()));
        }
        if let Some(index) = self.key_groups.iter().position(Vec::is_empty) {
            return Err(ProxyError::Decode(format!("key group {index} has no keys")));
        }
        Ok(())
    }
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// What the backend stores: encrypted branches plus their metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SealedDocument {
    pub branches: Vec<Map<String, Value>>,
    pub metadata: EncryptionMetadata,
}

impl SealedDocument {
    pub fn to_bytes(&self) -> ProxyResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProxyError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> ProxyResult<Self> {
        let document: Self =
            serde_json::from_slice(bytes).map_err(|e| ProxyError::Decode(e.to_string()))?;
        document.metadata.check()?;
        Ok(document)
    }
}
