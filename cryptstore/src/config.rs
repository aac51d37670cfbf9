//! JSON configuration for an encrypted storage.
//!
//! ```json
//! {
//!   "backend": { "module": "file_system", "root": "/var/lib/certs" },
//!   "format": "binary",
//!   "encryption": [
//!     { "provider": "local", "keys": [ { "type": "age", "identities": ["AGE-SECRET-KEY-..."] } ] }
//!   ]
//! }
//! ```

use crate::error::{ProxyError, ProxyResult};
use crate::format::PayloadFormat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Selects a registered backend; remaining fields go to its factory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub module: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// Selects a registered encryption provider; remaining fields go to its
/// factory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub format: PayloadFormat,
    #[serde(default)]
    pub encryption: Vec<ProviderConfig>,
}

impl StorageConfig {
    pub fn from_json(bytes: &[u8]) -> ProxyResult<Self> {
        let config: Self = serde_json::from_slice(bytes)
            .map_err(|e| ProxyError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> ProxyResult<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ProxyError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&bytes)
    }

    /// Checks the structural rules that do not need any module to be built.
    pub fn validate(&self) -> ProxyResult<()> {
        if self.backend.module.trim().is_empty() {
            return Err(ProxyError::Configuration(
                "field 'backend.module' cannot be empty".to_string(),
            ));
        }
        match self.encryption.len() {
            0 => Err(ProxyError::Configuration(
                "field 'encryption' cannot be empty".to_string(),
            )),
            1 => Ok(()),
            _ => Err(ProxyError::Configuration(
                "only 1 provider is supported".to_string(),
            )),
        }
    }
}
