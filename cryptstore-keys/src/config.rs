//! Declarative key configuration.

use crate::age::AgeConfig;
use crate::aws_kms::AwsKmsConfig;
use crate::azure_kv::AzureKvConfig;
use crate::descriptor::KeyKind;
use crate::error::KeyResult;
use crate::gcp_kms::GcpKmsConfig;
use crate::hc_vault::HcVaultConfig;
use crate::master_key::MasterKey;
use crate::pgp::PgpConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One configured master key, tagged by `type`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyConfig {
    Age(AgeConfig),
    GcpKms(GcpKmsConfig),
    AwsKms(AwsKmsConfig),
    AzureKv(AzureKvConfig),
    HcVault(HcVaultConfig),
    Pgp(PgpConfig),
}

impl KeyConfig {
    pub fn kind(&self) -> KeyKind {
        match self {
            KeyConfig::Age(_) => KeyKind::Age,
            KeyConfig::GcpKms(_) => KeyKind::GcpKms,
            KeyConfig::AwsKms(_) => KeyKind::AwsKms,
            KeyConfig::AzureKv(_) => KeyKind::AzureKv,
            KeyConfig::HcVault(_) => KeyKind::HcVault,
            KeyConfig::Pgp(_) => KeyKind::Pgp,
        }
    }

    /// Validates the configuration and builds the live key.
    pub fn build(&self) -> KeyResult<Arc<dyn MasterKey>> {
        let key: Arc<dyn MasterKey> = match self {
            KeyConfig::Age(c) => Arc::new(c.build()?),
            KeyConfig::GcpKms(c) => Arc::new(c.build()?),
            KeyConfig::AwsKms(c) => Arc::new(c.build()?),
            KeyConfig::AzureKv(c) => Arc::new(c.build()?),
            KeyConfig::HcVault(c) => Arc::new(c.build()?),
            KeyConfig::Pgp(c) => Arc::new(c.build()?),
        };
        Ok(key)
    }
}

/// Expands `{env.NAME}` placeholders. Unset variables expand to "".
pub fn expand_placeholders(input: &str) -> String {
    const OPEN: &str = "{env.";

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(&std::env::var(&after[..end]).unwrap_or_default());
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Trims and expands a required string field, rejecting empty results.
pub(crate) fn required(field: &str, value: &str) -> KeyResult<String> {
    let expanded = expand_placeholders(value.trim());
    if expanded.trim().is_empty() {
        return Err(crate::KeyError::Config(format!("{field} must not be empty")));
    }
    Ok(expanded.trim().to_string())
}
