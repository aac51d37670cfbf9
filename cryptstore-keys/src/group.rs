use crate::config::KeyConfig;
use crate::error::{KeyError, KeyResult};
use crate::master_key::MasterKey;
use std::sync::Arc;

/// Ordered, non-empty set of master keys. Any one member recovers the group.
#[derive(Clone, Debug)]
pub struct KeyGroup {
    keys: Vec<Arc<dyn MasterKey>>,
}

impl KeyGroup {
    pub fn new(keys: Vec<Arc<dyn MasterKey>>) -> KeyResult<Self> {
        if keys.is_empty() {
            return Err(KeyError::Config(
                "key group must contain at least one key".to_string(),
            ));
        }
        Ok(Self { keys })
    }

    pub fn from_configs(configs: &[KeyConfig]) -> KeyResult<Self> {
        let keys = configs
            .iter()
            .map(KeyConfig::build)
            .collect::<KeyResult<Vec<_>>>()?;
        Self::new(keys)
    }

    pub fn keys(&self) -> &[Arc<dyn MasterKey>] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false for a constructed group.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn MasterKey>> {
        self.keys.iter()
    }
}
