//! Key services: the boundary where data keys are wrapped and unwrapped.
//!
//! [`LocalKeyService`] holds live master keys in memory and dispatches by
//! key type. [`RemoteKeyService`] forwards the same two operations to an
//! out-of-process service over HTTP/JSON. Both are handed to the storage
//! proxy by an [`EncryptionProvider`], together with the key groups new
//! documents are wrapped for.

mod error;
pub mod local;
pub mod provider;
pub mod remote;
mod service;
pub mod wire;

pub use error::{ServiceError, ServiceResult};
pub use local::LocalKeyService;
pub use provider::{EncryptionProvider, GroupsConfig, LocalProvider, RemoteProvider};
pub use remote::RemoteKeyService;
pub use service::KeyService;
