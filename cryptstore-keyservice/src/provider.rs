//! Encryption providers: a key service plus the key groups to wrap for.

use crate::error::{ServiceError, ServiceResult};
use crate::local::LocalKeyService;
use crate::remote::RemoteKeyService;
use crate::service::KeyService;
use async_trait::async_trait;
use cryptstore_keys::{KeyConfig, KeyGroup};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Supplies the proxy with a key service and the groups new data keys are
/// wrapped for.
#[async_trait]
pub trait EncryptionProvider: Send + Sync + fmt::Debug {
    /// Registry name of the provider (`local`, `remote`, ...).
    fn name(&self) -> &str;

    fn key_service(&self) -> Arc<dyn KeyService>;

    fn key_groups(&self) -> &[KeyGroup];

    /// Releases provider resources. Called once at teardown.
    async fn cleanup(&self) -> ServiceResult<()> {
        Ok(())
    }
}

/// Either a single group (`keys`) or several (`key_groups`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GroupsConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<KeyConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_groups: Vec<Vec<KeyConfig>>,
}

impl GroupsConfig {
    /// Validates and builds the configured groups.
    pub fn build(&self) -> ServiceResult<Vec<KeyGroup>> {
        match (self.keys.is_empty(), self.key_groups.is_empty()) {
            (false, false) => Err(ServiceError::Config(
                "set either 'keys' or 'key_groups', not both".to_string(),
            )),
            (true, true) => Err(ServiceError::Config(
                "field 'keys' cannot be empty".to_string(),
            )),
            (false, true) => Ok(vec![KeyGroup::from_configs(&self.keys)?]),
            (true, false) => self
                .key_groups
                .iter()
                .enumerate()
                .map(|(i, group)| {
                    KeyGroup::from_configs(group).map_err(|e| {
                        ServiceError::Config(format!("key_groups[{i}]: {e}"))
                    })
                })
                .collect(),
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(provider: &str, config: Value) -> ServiceResult<T> {
    serde_json::from_value(config)
        .map_err(|e| ServiceError::Config(format!("{provider} provider: {e}")))
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LocalProviderConfig {
    #[serde(flatten)]
    pub groups: GroupsConfig,
}

/// In-process provider holding the live master keys.
#[derive(Debug)]
pub struct LocalProvider {
    groups: Vec<KeyGroup>,
    service: Arc<LocalKeyService>,
}

impl LocalProvider {
    pub fn new(groups: Vec<KeyGroup>) -> Self {
        let service = Arc::new(LocalKeyService::from_groups(&groups));
        Self { groups, service }
    }

    pub fn from_config(config: &LocalProviderConfig) -> ServiceResult<Self> {
        let groups = config.groups.build()?;
        info!(groups = groups.len(), "local encryption provider ready");
        Ok(Self::new(groups))
    }

    /// Builds the provider from its raw JSON configuration block.
    pub fn from_value(config: Value) -> ServiceResult<Self> {
        Self::from_config(&parse("local", config)?)
    }
}

#[async_trait]
impl EncryptionProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn key_service(&self) -> Arc<dyn KeyService> {
        self.service.clone()
    }

    fn key_groups(&self) -> &[KeyGroup] {
        &self.groups
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RemoteProviderConfig {
    pub address: String,
    #[serde(flatten)]
    pub groups: GroupsConfig,
}

/// Provider whose wrap/unwrap calls go to a remote key service.
#[derive(Debug)]
pub struct RemoteProvider {
    groups: Vec<KeyGroup>,
    service: Arc<RemoteKeyService>,
}

impl RemoteProvider {
    pub fn from_config(config: &RemoteProviderConfig) -> ServiceResult<Self> {
        let groups = config.groups.build()?;
        let service = Arc::new(RemoteKeyService::connect(&config.address)?);
        Ok(Self { groups, service })
    }

    pub fn from_value(config: Value) -> ServiceResult<Self> {
        Self::from_config(&parse("remote", config)?)
    }

    pub fn service(&self) -> &RemoteKeyService {
        &self.service
    }
}

#[async_trait]
impl EncryptionProvider for RemoteProvider {
    fn name(&self) -> &str {
        "remote"
    }

    fn key_service(&self) -> Arc<dyn KeyService> {
        self.service.clone()
    }

    fn key_groups(&self) -> &[KeyGroup] {
        &self.groups
    }

    async fn cleanup(&self) -> ServiceResult<()> {
        self.service.close().await;
        Ok(())
    }
}
