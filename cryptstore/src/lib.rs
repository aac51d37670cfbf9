//! # cryptstore
//!
//! Transparent encryption at rest for key/value storage. [`EncryptedStorage`]
//! sits in front of any [`Storage`] backend: structural operations (exists,
//! list, stat, delete, lock, unlock) pass straight through, while `store`
//! and `load` run an envelope-encryption pipeline.
//!
//! ## Write path
//!
//! 1. Parse the payload into a [`Document`] with the configured
//!    [`PayloadFormat`]. Empty documents are rejected.
//! 2. Generate a fresh data key and wrap it (or one XOR share of it per key
//!    group) with every master key of every group.
//! 3. Encrypt every leaf with ChaCha20-Poly1305, bound to its location, and
//!    record an encrypted SHA-512 MAC over the plaintext leaves.
//! 4. Serialize the sealed document and hand it to the backend.
//!
//! ## Read path
//!
//! The mirror image: the data key is recovered through the key service
//! (any key within a group, every group), leaves are decrypted and the MAC
//! is verified before any plaintext is returned.

mod config;
mod error;
pub mod format;
pub mod metadata;
mod proxy;
mod registry;
pub mod seal;
pub mod tree;

pub use config::{BackendConfig, ProviderConfig, StorageConfig};
pub use error::{ProxyError, ProxyResult};
pub use format::PayloadFormat;
pub use metadata::{EncryptionMetadata, FORMAT_VERSION, SealedDocument};
pub use proxy::EncryptedStorage;
pub use registry::Registry;
pub use tree::{Branch, Document, Leaf, Node};

pub use cryptstore_keys::{KeyConfig, KeyDescriptor, KeyGroup, MasterKey, WrappedKeyRecord};
pub use cryptstore_keyservice::{EncryptionProvider, KeyService, LocalProvider, RemoteProvider};
pub use cryptstore_storage::{KeyInfo, Storage, StorageError};
