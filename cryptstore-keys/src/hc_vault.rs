//! HashiCorp Vault transit keys.

use crate::config::{expand_placeholders, required};
use crate::descriptor::KeyDescriptor;
use crate::error::{KeyError, KeyResult};
use crate::http::{send_json, string_at};
use crate::master_key::MasterKey;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

pub const ADDR_ENV: &str = "VAULT_ADDR";
pub const TOKEN_ENV: &str = "VAULT_TOKEN";
pub const DEFAULT_ENGINE_PATH: &str = "transit";

fn default_engine_path() -> String {
    DEFAULT_ENGINE_PATH.to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct HcVaultConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_address: Option<String>,
    #[serde(default = "default_engine_path")]
    pub engine_path: String,
    pub key_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl fmt::Debug for HcVaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HcVaultConfig")
            .field("vault_address", &self.vault_address)
            .field("engine_path", &self.engine_path)
            .field("key_name", &self.key_name)
            .finish_non_exhaustive()
    }
}

impl HcVaultConfig {
    pub fn build(&self) -> KeyResult<HcVaultKey> {
        let address = match &self.vault_address {
            Some(address) => address.clone(),
            None => std::env::var(ADDR_ENV).map_err(|_| {
                KeyError::Config(format!("hc_vault needs vault_address or {ADDR_ENV}"))
            })?,
        };
        HcVaultKey::new(&address, &self.engine_path, &self.key_name, self.token.clone())
    }
}

pub struct HcVaultKey {
    vault_address: String,
    engine_path: String,
    key_name: String,
    token: Option<String>,
    client: Client,
}

impl HcVaultKey {
    pub fn new(
        vault_address: &str,
        engine_path: &str,
        key_name: &str,
        token: Option<String>,
    ) -> KeyResult<Self> {
        let vault_address = required("hc_vault vault_address", vault_address)?;
        let engine_path = expand_placeholders(engine_path.trim());
        let engine_path = engine_path.trim_matches('/');

        Ok(Self {
            vault_address: vault_address.trim_end_matches('/').to_string(),
            engine_path: if engine_path.is_empty() {
                default_engine_path()
            } else {
                engine_path.to_string()
            },
            key_name: required("hc_vault key_name", key_name)?,
            token,
            client: Client::new(),
        })
    }

    async fn token(&self) -> Result<String, String> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        if let Some(token) = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()) {
            return Ok(token);
        }
        let home = std::env::var("HOME").map_err(|_| format!("{TOKEN_ENV} is unset"))?;
        let path = std::path::Path::new(&home).join(".vault-token");
        match tokio::fs::read_to_string(&path).await {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(format!("{TOKEN_ENV} is unset and {} is unreadable", path.display())),
        }
    }

    fn url(&self, op: &str) -> String {
        format!(
            "{}/v1/{}/{op}/{}",
            self.vault_address, self.engine_path, self.key_name
        )
    }

    async fn wrap(&self, data_key: &[u8]) -> Result<Vec<u8>, String> {
        let token = self.token().await?;
        let body = json!({ "plaintext": STANDARD.encode(data_key) });
        let request = self.client.post(self.url("encrypt")).header("X-Vault-Token", token);
        let response = send_json(request, &body).await?;
        Ok(string_at(&response, "/data/ciphertext")?.as_bytes().to_vec())
    }

    async fn unwrap(&self, wrapped: &[u8]) -> Result<Vec<u8>, String> {
        let ciphertext =
            std::str::from_utf8(wrapped).map_err(|_| "wrapped key is not a vault ciphertext")?;
        let token = self.token().await?;
        let body = json!({ "ciphertext": ciphertext });
        let request = self.client.post(self.url("decrypt")).header("X-Vault-Token", token);
        let response = send_json(request, &body).await?;
        STANDARD
            .decode(string_at(&response, "/data/plaintext")?)
            .map_err(|e| format!("plaintext is not base64: {e}"))
    }
}

impl fmt::Debug for HcVaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HcVaultKey")
            .field("vault_address", &self.vault_address)
            .field("engine_path", &self.engine_path)
            .field("key_name", &self.key_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MasterKey for HcVaultKey {
    fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor::HcVault {
            vault_address: self.vault_address.clone(),
            engine_path: self.engine_path.clone(),
            key_name: self.key_name.clone(),
        }
    }

    async fn encrypt(&self, data_key: &[u8]) -> KeyResult<Vec<u8>> {
        self.wrap(data_key).await.map_err(|reason| KeyError::Encrypt {
            key: self.descriptor().to_string(),
            reason,
        })
    }

    async fn decrypt(&self, wrapped: &[u8]) -> KeyResult<Vec<u8>> {
        self.unwrap(wrapped).await.map_err(|reason| KeyError::Decrypt {
            key: self.descriptor().to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_path_defaults_to_transit() {
        let key = HcVaultKey::new("http://vault:8200/", "", "certs", None).unwrap();
        assert_eq!(key.url("encrypt"), "http://vault:8200/v1/transit/encrypt/certs");
    }

    #[test]
    fn custom_engine_path_is_trimmed() {
        let key = HcVaultKey::new("http://vault:8200", "/kv-transit/", "certs", None).unwrap();
        assert_eq!(key.url("decrypt"), "http://vault:8200/v1/kv-transit/decrypt/certs");
    }

    #[test]
    fn key_name_is_required() {
        assert!(HcVaultKey::new("http://vault:8200", "transit", " ", None).is_err());
    }
}
