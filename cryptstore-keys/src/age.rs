//! Local age identities.
//!
//! Recipients are standard `age1...` X25519 recipients and identities are
//! `AGE-SECRET-KEY-1...` strings, as produced by `age-keygen`. Data keys
//! are wrapped into a regular age file addressed to the recipient, so any
//! age implementation holding the identity can unwrap them.

use crate::descriptor::KeyDescriptor;
use crate::error::{KeyError, KeyResult};
use crate::master_key::MasterKey;
use age::x25519::{Identity, Recipient};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

pub const IDENTITY_PREFIX: &str = "AGE-SECRET-KEY-";

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AgeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identities: Vec<String>,
}

impl fmt::Debug for AgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgeConfig")
            .field("recipient", &self.recipient)
            .field("identities", &format_args!("[{} redacted]", self.identities.len()))
            .finish()
    }
}

impl AgeConfig {
    pub fn build(&self) -> KeyResult<AgeKey> {
        let identities = self
            .identities
            .iter()
            .map(|s| parse_identity(s))
            .collect::<KeyResult<Vec<_>>>()?;

        let recipient = match (&self.recipient, identities.first()) {
            (Some(r), _) => parse_recipient(r)?,
            (None, Some(first)) => first.to_public(),
            (None, None) => {
                return Err(KeyError::Config(
                    "age key needs a recipient or at least one identity".to_string(),
                ));
            }
        };

        Ok(AgeKey {
            recipient,
            identities,
        })
    }
}

/// An age recipient plus the identities able to open data keys sealed to it.
pub struct AgeKey {
    recipient: Recipient,
    identities: Vec<Identity>,
}

impl AgeKey {
    /// Builds a wrap-only key from a recipient string.
    pub fn recipient_only(recipient: &str) -> KeyResult<Self> {
        Ok(Self {
            recipient: parse_recipient(recipient)?,
            identities: Vec::new(),
        })
    }

    /// Generates a fresh `(recipient, identity)` pair in text form.
    pub fn generate() -> (String, String) {
        let identity = Identity::generate();
        let secret = identity.to_string();
        (
            identity.to_public().to_string(),
            secret.expose_secret().to_string(),
        )
    }

    pub fn recipient(&self) -> String {
        self.recipient.to_string()
    }

    fn failure(&self, reason: impl Into<String>) -> KeyError {
        KeyError::Decrypt {
            key: self.descriptor().to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Debug for AgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgeKey")
            .field("recipient", &self.recipient())
            .field("identities", &self.identities.len())
            .finish()
    }
}

#[async_trait]
impl MasterKey for AgeKey {
    fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor::Age {
            recipient: self.recipient(),
        }
    }

    async fn encrypt(&self, data_key: &[u8]) -> KeyResult<Vec<u8>> {
        age::encrypt(&self.recipient, data_key).map_err(|e| KeyError::Encrypt {
            key: self.descriptor().to_string(),
            reason: e.to_string(),
        })
    }

    async fn decrypt(&self, wrapped: &[u8]) -> KeyResult<Vec<u8>> {
        if self.identities.is_empty() {
            return Err(self.failure("no identities configured"));
        }
        let decryptor = age::Decryptor::new(wrapped).map_err(|e| self.failure(e.to_string()))?;
        let mut reader = decryptor
            .decrypt(self.identities.iter().map(|i| i as &dyn age::Identity))
            .map_err(|e| {
                self.failure(format!(
                    "none of {} identities matched: {e}",
                    self.identities.len()
                ))
            })?;

        let mut data_key = Vec::new();
        reader
            .read_to_end(&mut data_key)
            .map_err(|e| self.failure(e.to_string()))?;
        Ok(data_key)
    }
}

fn parse_recipient(text: &str) -> KeyResult<Recipient> {
    text.trim()
        .parse::<Recipient>()
        .map_err(|e| KeyError::Config(format!("invalid age recipient: {e}")))
}

fn parse_identity(text: &str) -> KeyResult<Identity> {
    let text = text.trim();
    if !text.starts_with(IDENTITY_PREFIX) {
        return Err(KeyError::Config(format!(
            "age identity must start with {IDENTITY_PREFIX}"
        )));
    }
    text.parse::<Identity>()
        .map_err(|e| KeyError::Config(format!("invalid age identity: {e}")))
}
