//! Immutable descriptions of master keys.
//!
//! A descriptor carries everything needed to reconstruct a master key for a
//! single wrap or unwrap attempt, except secrets. Secrets (identities,
//! tokens) live only in locally configured keys.

use crate::error::KeyError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Master key variant tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Age,
    GcpKms,
    AwsKms,
    AzureKv,
    HcVault,
    Pgp,
}

impl KeyKind {
    pub const ALL: [KeyKind; 6] = [
        KeyKind::Age,
        KeyKind::GcpKms,
        KeyKind::AwsKms,
        KeyKind::AzureKv,
        KeyKind::HcVault,
        KeyKind::Pgp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Age => "age",
            KeyKind::GcpKms => "gcp_kms",
            KeyKind::AwsKms => "aws_kms",
            KeyKind::AzureKv => "azure_kv",
            KeyKind::HcVault => "hc_vault",
            KeyKind::Pgp => "pgp",
        }
    }

    /// Kinds whose wrapped records do not identify the local instance that
    /// produced them, so unwrapping must try every configured candidate.
    pub fn requires_scan(&self) -> bool {
        matches!(self, KeyKind::Age | KeyKind::GcpKms)
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyKind {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| KeyError::UnsupportedKeyType(s.to_string()))
    }
}

/// Tagged description of one master key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyDescriptor {
    Age {
        recipient: String,
    },
    GcpKms {
        resource_id: String,
    },
    AwsKms {
        arn: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        context: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profile: Option<String>,
    },
    AzureKv {
        vault_url: String,
        name: String,
        version: String,
    },
    HcVault {
        vault_address: String,
        engine_path: String,
        key_name: String,
    },
    Pgp {
        fingerprint: String,
    },
}

impl KeyDescriptor {
    pub fn kind(&self) -> KeyKind {
        match self {
            KeyDescriptor::Age { .. } => KeyKind::Age,
            KeyDescriptor::GcpKms { .. } => KeyKind::GcpKms,
            KeyDescriptor::AwsKms { .. } => KeyKind::AwsKms,
            KeyDescriptor::AzureKv { .. } => KeyKind::AzureKv,
            KeyDescriptor::HcVault { .. } => KeyKind::HcVault,
            KeyDescriptor::Pgp { .. } => KeyKind::Pgp,
        }
    }
}

/// Human-readable identity used in logs and aggregated errors.
impl fmt::Display for KeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyDescriptor::Age { recipient } => write!(f, "age:{recipient}"),
            KeyDescriptor::GcpKms { resource_id } => write!(f, "gcp_kms:{resource_id}"),
            KeyDescriptor::AwsKms { arn, role, .. } => match role {
                Some(role) => write!(f, "aws_kms:{arn}+{role}"),
                None => write!(f, "aws_kms:{arn}"),
            },
            KeyDescriptor::AzureKv {
                vault_url,
                name,
                version,
            } => write!(f, "azure_kv:{vault_url}/keys/{name}/{version}"),
            KeyDescriptor::HcVault {
                vault_address,
                engine_path,
                key_name,
            } => write!(f, "hc_vault:{vault_address}/v1/{engine_path}/keys/{key_name}"),
            KeyDescriptor::Pgp { fingerprint } => write!(f, "pgp:{fingerprint}"),
        }
    }
}
