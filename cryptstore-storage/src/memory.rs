//! In-process storage backend.

use crate::error::{StorageError, StorageResult};
use crate::path::{list_from_keys, normalize_key, normalize_prefix};
use crate::{KeyInfo, Storage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    modified: DateTime<Utc>,
}

/// Map-backed storage. Locks are process-local; waiters wake on unlock.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Entry>>,
    locks: Mutex<HashSet<String>>,
    released: Notify,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let key = normalize_key(key)?;
        debug!(key = %key, bytes = value.len(), "memory store");
        self.entries.write().await.insert(
            key,
            Entry {
                value: value.to_vec(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn load(&self, key: &str) -> StorageResult<Vec<u8>> {
        let key = normalize_key(key)?;
        self.entries
            .read()
            .await
            .get(&key)
            .map(|e| e.value.clone())
            .ok_or(StorageError::NotFound(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let key = normalize_key(key)?;
        let mut entries = self.entries.write().await;
        if entries.remove(&key).is_some() {
            return Ok(());
        }
        // Deleting a prefix removes everything beneath it.
        let nested = format!("{key}/");
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(&nested));
        if entries.len() == before {
            return Err(StorageError::NotFound(key));
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> bool {
        let Ok(key) = normalize_key(key) else {
            return false;
        };
        let entries = self.entries.read().await;
        let nested = format!("{key}/");
        entries.contains_key(&key) || entries.keys().any(|k| k.starts_with(&nested))
    }

    async fn list(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<String>> {
        let prefix = normalize_prefix(prefix)?;
        let entries = self.entries.read().await;
        let listed = list_from_keys(entries.keys().map(String::as_str), &prefix, recursive);
        if listed.is_empty() && !prefix.is_empty() {
            return Err(StorageError::NotFound(prefix));
        }
        Ok(listed)
    }

    async fn stat(&self, key: &str) -> StorageResult<KeyInfo> {
        let key = normalize_key(key)?;
        let entries = self.entries.read().await;
        if let Some(entry) = entries.get(&key) {
            return Ok(KeyInfo {
                key,
                modified: entry.modified,
                size: entry.value.len() as u64,
                is_terminal: true,
            });
        }

        let nested = format!("{key}/");
        entries
            .iter()
            .filter(|(k, _)| k.starts_with(&nested))
            .map(|(_, e)| e.modified)
            .max()
            .map(|modified| KeyInfo {
                key: key.clone(),
                modified,
                size: 0,
                is_terminal: false,
            })
            .ok_or(StorageError::NotFound(key))
    }

    async fn lock(&self, name: &str) -> StorageResult<()> {
        loop {
            // Register for wakeups before checking, so an unlock between the
            // check and the await is not missed.
            let released = self.released.notified();
            if self.locks.lock().await.insert(name.to_string()) {
                debug!(lock = %name, "memory lock acquired");
                return Ok(());
            }
            released.await;
        }
    }

    async fn unlock(&self, name: &str) -> StorageResult<()> {
        if !self.locks.lock().await.remove(name) {
            return Err(StorageError::Lock(format!("{name} is not locked")));
        }
        self.released.notify_waiters();
        Ok(())
    }
}
