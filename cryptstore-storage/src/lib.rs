//! Storage backends for cryptstore.
//!
//! A backend is an opaque key/value store with hierarchical listing and
//! named locks. Keys are `/`-separated relative paths. The encryption
//! proxy wraps any [`Storage`] and presents the same trait itself.

mod error;
pub mod filesystem;
pub mod memory;
pub mod path;
pub mod s3;

pub use error::{StorageError, StorageResult};
pub use filesystem::{FileSystemConfig, FileSystemStorage};
pub use memory::MemoryStorage;
pub use s3::{S3Config, S3Storage};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata about a stored key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub key: String,
    pub modified: DateTime<Utc>,
    pub size: u64,
    /// False when the key names a directory-like prefix rather than a value.
    pub is_terminal: bool,
}

/// Key/value storage with listing and advisory locks.
#[async_trait]
pub trait Storage: Send + Sync + fmt::Debug {
    async fn store(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Fails with [`StorageError::NotFound`] if the key does not exist.
    async fn load(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Fails with [`StorageError::NotFound`] if the key does not exist.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> bool;

    /// Lists keys under `prefix`. Without `recursive` only direct children
    /// (values and sub-prefixes) are returned.
    async fn list(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<String>>;

    async fn stat(&self, key: &str) -> StorageResult<KeyInfo>;

    /// Blocks until the named lock is acquired.
    async fn lock(&self, name: &str) -> StorageResult<()>;

    /// Fails with [`StorageError::Lock`] if the lock is not held.
    async fn unlock(&self, name: &str) -> StorageResult<()>;
}
