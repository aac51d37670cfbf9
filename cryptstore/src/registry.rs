//! Named factories for backends and encryption providers.
//!
//! A [`Registry`] is built once at startup and passed to
//! [`crate::EncryptedStorage::provision`]. Factories receive the module's
//! configuration block (without its `module` / `provider` field).

use crate::config::{BackendConfig, ProviderConfig};
use crate::error::{ProxyError, ProxyResult};
use cryptstore_keyservice::{EncryptionProvider, LocalProvider, RemoteProvider};
use cryptstore_storage::{
    FileSystemConfig, FileSystemStorage, MemoryStorage, S3Config, S3Storage, Storage,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub type BackendFactory =
    Arc<dyn Fn(Value) -> BoxFuture<'static, ProxyResult<Arc<dyn Storage>>> + Send + Sync>;
pub type ProviderFactory = Arc<
    dyn Fn(Value) -> BoxFuture<'static, ProxyResult<Arc<dyn EncryptionProvider>>> + Send + Sync,
>;

#[derive(Clone, Default)]
pub struct Registry {
    backends: HashMap<String, BackendFactory>,
    providers: HashMap<String, ProviderFactory>,
}

fn options<T: DeserializeOwned>(module: &str, value: Value) -> ProxyResult<T> {
    serde_json::from_value(value)
        .map_err(|e| ProxyError::Configuration(format!("{module}: {e}")))
}

fn configuration(module: &str, err: impl fmt::Display) -> ProxyError {
    ProxyError::Configuration(format!("{module}: {err}"))
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in backends (`file_system`, `memory`, `s3`)
    /// and providers (`local`, `remote`).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register_backend("memory", |_| async {
            Ok(Arc::new(MemoryStorage::new()) as Arc<dyn Storage>)
        });
        registry.register_backend("file_system", |value| async move {
            let config: FileSystemConfig = options("file_system", value)?;
            let storage = FileSystemStorage::new(&config)
                .map_err(|e| configuration("file_system", e))?;
            Ok(Arc::new(storage) as Arc<dyn Storage>)
        });
        registry.register_backend("s3", |value| async move {
            let config: S3Config = options("s3", value)?;
            let storage = S3Storage::new(&config)
                .await
                .map_err(|e| configuration("s3", e))?;
            Ok(Arc::new(storage) as Arc<dyn Storage>)
        });

        registry.register_provider("local", |value| async move {
            let provider = LocalProvider::from_value(value).map_err(|e| configuration("local", e))?;
            Ok(Arc::new(provider) as Arc<dyn EncryptionProvider>)
        });
        registry.register_provider("remote", |value| async move {
            let provider =
                RemoteProvider::from_value(value).map_err(|e| configuration("remote", e))?;
            Ok(Arc::new(provider) as Arc<dyn EncryptionProvider>)
        });

        registry
    }

    pub fn register_backend<F, Fut>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProxyResult<Arc<dyn Storage>>> + Send + 'static,
    {
        let factory: BackendFactory = Arc::new(move |value| factory(value).boxed());
        self.backends.insert(name.into(), factory);
    }

    pub fn register_provider<F, Fut>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProxyResult<Arc<dyn EncryptionProvider>>> + Send + 'static,
    {
        let factory: ProviderFactory = Arc::new(move |value| factory(value).boxed());
        self.providers.insert(name.into(), factory);
    }

    pub async fn build_backend(&self, config: &BackendConfig) -> ProxyResult<Arc<dyn Storage>> {
        let factory = self.backends.get(&config.module).ok_or_else(|| {
            ProxyError::Configuration(format!("unknown backend module {:?}", config.module))
        })?;
        factory(Value::Object(config.options.clone())).await
    }

    pub async fn build_provider(
        &self,
        config: &ProviderConfig,
    ) -> ProxyResult<Arc<dyn EncryptionProvider>> {
        let factory = self.providers.get(&config.provider).ok_or_else(|| {
            ProxyError::Configuration(format!("unknown encryption provider {:?}", config.provider))
        })?;
        factory(Value::Object(config.options.clone())).await
    }

    pub fn backend_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.backends.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("backends", &self.backend_names())
            .field("providers", &self.provider_names())
            .finish()
    }
}
