//! S3 (or S3-compatible) backend.
//!
//! Objects live under an optional key prefix. Locks are objects under
//! `locks/` created with `If-None-Match: *`, so only one writer can create
//! a given lock; locks older than `stale_lock_secs` are broken.

use crate::error::{StorageError, StorageResult};
use crate::path::{join, list_from_keys, lock_file_name, normalize_key, normalize_prefix};
use crate::{KeyInfo, Storage};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const LOCKS_PREFIX: &str = "locks";
const PRECONDITION_FAILED: u16 = 412;
const CONFLICT: u16 = 409;

fn default_stale_lock_secs() -> u64 {
    2 * 60 * 60
}

fn default_lock_poll_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint (MinIO, R2, ...). Enables path-style addressing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_stale_lock_secs")]
    pub stale_lock_secs: u64,
    #[serde(default = "default_lock_poll_ms")]
    pub lock_poll_ms: u64,
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
    prefix: String,
    stale_lock: Duration,
    lock_poll: Duration,
}

impl S3Storage {
    /// Builds the client from the default AWS provider chain.
    pub async fn new(config: &S3Config) -> StorageResult<Self> {
        if config.bucket.trim().is_empty() {
            return Err(StorageError::Config("s3 bucket must be set".to_string()));
        }
        if config.region.trim().is_empty() {
            return Err(StorageError::Config("s3 region must be set".to_string()));
        }
        if config.lock_poll_ms == 0 {
            return Err(StorageError::Config("lock_poll_ms must be positive".to_string()));
        }

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(ref endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: S3Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            prefix: normalize_prefix(&config.prefix)?,
            stale_lock: Duration::from_secs(config.stale_lock_secs),
            lock_poll: Duration::from_millis(config.lock_poll_ms),
        })
    }

    fn object_key(&self, key: &str) -> String {
        join(&self.prefix, key)
    }

    fn lock_key(&self, name: &str) -> String {
        self.object_key(&join(LOCKS_PREFIX, &lock_file_name(name)))
    }

    /// Last-modified time of an object, or None if it does not exist.
    async fn head(&self, object_key: &str) -> StorageResult<Option<(DateTime<Utc>, u64)>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
        {
            Ok(resp) => {
                let modified = resp
                    .last_modified()
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
                    .unwrap_or_default();
                let size = resp.content_length().unwrap_or(0).max(0) as u64;
                Ok(Some((modified, size)))
            }
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    Err(StorageError::S3(format!(
                        "head object failed for {object_key}: {service_err}"
                    )))
                }
            }
        }
    }

    /// All object keys (relative to the store prefix) under `prefix`.
    async fn keys_under(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let full = self.object_key(prefix);
        let search = if full.is_empty() { full } else { format!("{full}/") };
        let strip = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        };

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&search)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::S3(format!("list failed for prefix {search}: {e}")))?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    .filter_map(|k| k.strip_prefix(strip.as_str()))
                    .map(str::to_string),
            );

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated() == Some(true) => {
                    continuation = Some(token.to_string())
                }
                _ => break,
            }
        }
        Ok(keys)
    }

    /// Creates the lock object unless it exists. Ok(false) means it is held.
    async fn try_lock(&self, lock_key: &str) -> StorageResult<bool> {
        let body = serde_json::json!({ "created": Utc::now() }).to_string();
        match self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(lock_key)
            .if_none_match("*")
            .body(ByteStream::from(body.into_bytes()))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let status = e.raw_response().map(|r| r.status().as_u16());
                if matches!(status, Some(PRECONDITION_FAILED | CONFLICT)) {
                    Ok(false)
                } else {
                    Err(StorageError::S3(format!("lock put failed for {lock_key}: {e}")))
                }
            }
        }
    }

    async fn delete_object(&self, object_key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("delete failed for {object_key}: {e}")))?;
        Ok(())
    }
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn store(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let key = normalize_key(key)?;
        let object_key = self.object_key(&key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(value.to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("upload failed for {object_key}: {e}")))?;

        debug!("uploaded {} bytes to s3://{}/{object_key}", value.len(), self.bucket);
        Ok(())
    }

    async fn load(&self, key: &str) -> StorageResult<Vec<u8>> {
        let key = normalize_key(key)?;
        let object_key = self.object_key(&key);
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    return Err(StorageError::NotFound(key));
                }
                return Err(StorageError::S3(format!(
                    "download failed for {object_key}: {service_err}"
                )));
            }
        };

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(format!("failed to read body for {object_key}: {e}")))?;
        let bytes = body.into_bytes().to_vec();
        debug!("downloaded {} bytes from s3://{}/{object_key}", bytes.len(), self.bucket);
        Ok(bytes)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let key = normalize_key(key)?;
        let object_key = self.object_key(&key);
        if self.head(&object_key).await?.is_some() {
            return self.delete_object(&object_key).await;
        }

        let nested = self.keys_under(&key).await?;
        if nested.is_empty() {
            return Err(StorageError::NotFound(key));
        }
        for child in nested {
            self.delete_object(&self.object_key(&child)).await?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> bool {
        let Ok(key) = normalize_key(key) else {
            return false;
        };
        match self.head(&self.object_key(&key)).await {
            Ok(Some(_)) => true,
            Ok(None) => self.keys_under(&key).await.is_ok_and(|k| !k.is_empty()),
            Err(e) => {
                warn!(key = %key, error = %e, "exists check failed");
                false
            }
        }
    }

    async fn list(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<String>> {
        let prefix = normalize_prefix(prefix)?;
        let keys = self.keys_under(&prefix).await?;
        let listed = list_from_keys(keys.iter().map(String::as_str), &prefix, recursive);
        if listed.is_empty() && !prefix.is_empty() {
            return Err(StorageError::NotFound(prefix));
        }
        Ok(listed)
    }

    async fn stat(&self, key: &str) -> StorageResult<KeyInfo> {
        let key = normalize_key(key)?;
        if let Some((modified, size)) = self.head(&self.object_key(&key)).await? {
            return Ok(KeyInfo {
                key,
                modified,
                size,
                is_terminal: true,
            });
        }
        if self.keys_under(&key).await?.is_empty() {
            return Err(StorageError::NotFound(key));
        }
        Ok(KeyInfo {
            key,
            modified: DateTime::<Utc>::default(),
            size: 0,
            is_terminal: false,
        })
    }

    async fn lock(&self, name: &str) -> StorageResult<()> {
        let lock_key = self.lock_key(name);
        loop {
            if self.try_lock(&lock_key).await? {
                debug!(lock = %name, "s3 lock acquired");
                return Ok(());
            }
            if let Some((created, _)) = self.head(&lock_key).await? {
                let age = (Utc::now() - created).to_std().unwrap_or_default();
                if age > self.stale_lock {
                    warn!(lock = %name, "breaking stale lock");
                    self.delete_object(&lock_key).await?;
                    continue;
                }
            }
            tokio::time::sleep(self.lock_poll).await;
        }
    }

    async fn unlock(&self, name: &str) -> StorageResult<()> {
        let lock_key = self.lock_key(name);
        if self.head(&lock_key).await?.is_none() {
            return Err(StorageError::Lock(format!("{name} is not locked")));
        }
        self.delete_object(&lock_key).await
    }
}
