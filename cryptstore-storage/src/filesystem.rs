//! Local filesystem backend.
//!
//! Values are files under `root`; writes go to a temp file in the same
//! directory and are renamed into place. Locks are files under
//! `root/locks/`, created exclusively and broken once older than
//! `stale_lock_secs`.

use crate::error::{StorageError, StorageResult};
use crate::path::{join, lock_file_name, normalize_key, normalize_prefix};
use crate::{KeyInfo, Storage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

pub const LOCKS_DIR: &str = "locks";
const TEMP_SUFFIX: &str = ".tmp";

fn default_stale_lock_secs() -> u64 {
    2 * 60 * 60
}

fn default_lock_poll_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSystemConfig {
    pub root: PathBuf,
    #[serde(default = "default_stale_lock_secs")]
    pub stale_lock_secs: u64,
    #[serde(default = "default_lock_poll_ms")]
    pub lock_poll_ms: u64,
}

impl FileSystemConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stale_lock_secs: default_stale_lock_secs(),
            lock_poll_ms: default_lock_poll_ms(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    root: PathBuf,
    stale_lock: Duration,
    lock_poll: Duration,
}

impl FileSystemStorage {
    pub fn new(config: &FileSystemConfig) -> StorageResult<Self> {
        if config.root.as_os_str().is_empty() {
            return Err(StorageError::Config("file_system root must be set".to_string()));
        }
        if config.lock_poll_ms == 0 {
            return Err(StorageError::Config("lock_poll_ms must be positive".to_string()));
        }
        Ok(Self {
            root: config.root.clone(),
            stale_lock: Duration::from_secs(config.stale_lock_secs),
            lock_poll: Duration::from_millis(config.lock_poll_ms),
        })
    }

    fn path_of(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.root.clone(), |p, seg| p.join(seg))
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join(LOCKS_DIR).join(lock_file_name(name))
    }

    fn not_found(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            _ => StorageError::Io(e),
        }
    }

    /// Tries once to create the lock file. Ok(false) means someone holds it.
    async fn try_lock(&self, path: &Path) -> StorageResult<bool> {
        let created = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await;
        match created {
            Ok(mut file) => {
                let stamp = serde_json::json!({ "created": Utc::now() }).to_string();
                file.write_all(stamp.as_bytes()).await?;
                file.sync_all().await?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_stale(&self, path: &Path) -> bool {
        let Ok(meta) = fs::metadata(path).await else {
            return false;
        };
        meta.modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .is_some_and(|age| age > self.stale_lock)
    }

    async fn walk(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<String>> {
        let mut out = Vec::new();
        let mut pending = vec![prefix.to_string()];
        while let Some(dir_key) = pending.pop() {
            let dir = if dir_key.is_empty() {
                self.root.clone()
            } else {
                self.path_of(&dir_key)
            };
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // A root that was never written to lists as empty.
                Err(e) if e.kind() == ErrorKind::NotFound && dir_key.is_empty() => continue,
                Err(e) => return Err(Self::not_found(&dir_key)(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') && name.ends_with(TEMP_SUFFIX) {
                    continue;
                }
                let key = join(&dir_key, &name);
                let is_dir = entry.file_type().await?.is_dir();
                if recursive && is_dir {
                    pending.push(key);
                } else {
                    out.push(key);
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

#[async_trait]
impl Storage for FileSystemStorage {
    async fn store(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let key = normalize_key(key)?;
        let path = self.path_of(&key);
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = parent.join(format!(".{file_name}.{}{TEMP_SUFFIX}", Uuid::new_v4()));

        let mut file = fs::File::create(&temp).await?;
        let written = async {
            file.write_all(value).await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!(key = %key, bytes = value.len(), "file_system store");
        Ok(())
    }

    async fn load(&self, key: &str) -> StorageResult<Vec<u8>> {
        let key = normalize_key(key)?;
        fs::read(self.path_of(&key))
            .await
            .map_err(Self::not_found(&key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let key = normalize_key(key)?;
        let path = self.path_of(&key);
        let meta = fs::metadata(&path).await.map_err(Self::not_found(&key))?;
        if meta.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await.map_err(Self::not_found(&key))?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> bool {
        match normalize_key(key) {
            Ok(key) => fs::try_exists(self.path_of(&key)).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn list(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<String>> {
        let prefix = normalize_prefix(prefix)?;
        self.walk(&prefix, recursive).await
    }

    async fn stat(&self, key: &str) -> StorageResult<KeyInfo> {
        let key = normalize_key(key)?;
        let meta = fs::metadata(self.path_of(&key))
            .await
            .map_err(Self::not_found(&key))?;
        let modified = meta.modified().map(DateTime::<Utc>::from)?;
        Ok(KeyInfo {
            key,
            modified,
            size: meta.len(),
            is_terminal: meta.is_file(),
        })
    }

    async fn lock(&self, name: &str) -> StorageResult<()> {
        let path = self.lock_path(name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        loop {
            if self.try_lock(&path).await? {
                debug!(lock = %name, "file_system lock acquired");
                return Ok(());
            }
            if self.is_stale(&path).await {
                warn!(lock = %name, "breaking stale lock");
                match fs::remove_file(&path).await {
                    Ok(()) => continue,
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            tokio::time::sleep(self.lock_poll).await;
        }
    }

    async fn unlock(&self, name: &str) -> StorageResult<()> {
        match fs::remove_file(self.lock_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::Lock(format!("{name} is not locked")))
            }
            Err(e) => Err(e.into()),
        }
    }
}
