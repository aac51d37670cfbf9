//! Master keys and key groups for cryptstore.
//!
//! A [`MasterKey`] wraps and unwraps data keys; it never touches document
//! data. Every variant is built from a declarative [`KeyConfig`] and is
//! described on disk by an immutable [`KeyDescriptor`] stored inside a
//! [`WrappedKeyRecord`] next to the wrapped key bytes.
//!
//! Variants:
//! - `age`: standard age X25519 recipient/identities
//! - `gcp_kms`: Google Cloud KMS crypto key
//! - `aws_kms`: AWS KMS key ARN, optionally through an assumed role
//! - `azure_kv`: Azure Key Vault key (wrapkey/unwrapkey)
//! - `hc_vault`: HashiCorp Vault transit key
//! - `pgp`: GnuPG key by fingerprint
//!
//! A [`KeyGroup`] is an ordered, non-empty set of master keys. Any one key
//! in a group can recover the group's share of the data key.

pub mod age;
pub mod aws_kms;
pub mod azure_kv;
pub mod config;
pub mod descriptor;
mod error;
pub mod gcp_kms;
mod group;
pub mod hc_vault;
mod http;
pub mod master_key;
pub mod pgp;
pub mod record;

pub use config::KeyConfig;
pub use descriptor::{KeyDescriptor, KeyKind};
pub use error::{KeyError, KeyResult};
pub use group::KeyGroup;
pub use master_key::{MasterKey, from_descriptor};
pub use record::WrappedKeyRecord;
