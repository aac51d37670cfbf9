//! Azure Key Vault keys via the `wrapkey` / `unwrapkey` operations.
//!
//! Bearer tokens come from the config, `AZURE_KEYVAULT_TOKEN`, or a client
//! credentials grant using `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
//! `AZURE_CLIENT_SECRET`.

use crate::config::required;
use crate::descriptor::KeyDescriptor;
use crate::error::{KeyError, KeyResult};
use crate::http::{send_json, string_at};
use crate::master_key::MasterKey;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use tracing::debug;

pub const API_VERSION: &str = "7.4";
pub const ALGORITHM: &str = "RSA-OAEP-256";
pub const TOKEN_ENV: &str = "AZURE_KEYVAULT_TOKEN";
const AUTHORITY_ENV: &str = "AZURE_AUTHORITY_HOST";
const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const VAULT_SCOPE: &str = "https://vault.azure.net/.default";

#[derive(Clone, Serialize, Deserialize)]
pub struct AzureKvConfig {
    pub vault_url: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl fmt::Debug for AzureKvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureKvConfig")
            .field("vault_url", &self.vault_url)
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl AzureKvConfig {
    pub fn build(&self) -> KeyResult<AzureKvKey> {
        AzureKvKey::new(&self.vault_url, &self.name, &self.version, self.token.clone())
    }
}

pub struct AzureKvKey {
    vault_url: String,
    name: String,
    version: String,
    token: Option<String>,
    client: Client,
}

impl AzureKvKey {
    pub fn new(
        vault_url: &str,
        name: &str,
        version: &str,
        token: Option<String>,
    ) -> KeyResult<Self> {
        Ok(Self {
            vault_url: required("azure_kv vault_url", vault_url)?
                .trim_end_matches('/')
                .to_string(),
            name: required("azure_kv name", name)?,
            version: required("azure_kv version", version)?,
            token,
            client: Client::new(),
        })
    }

    async fn bearer(&self) -> Result<String, String> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        if let Some(token) = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()) {
            return Ok(token);
        }
        self.client_credentials().await
    }

    async fn client_credentials(&self) -> Result<String, String> {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| format!("no token configured and {name} is unset"))
        };
        let tenant = var("AZURE_TENANT_ID")?;
        let client_id = var("AZURE_CLIENT_ID")?;
        let client_secret = var("AZURE_CLIENT_SECRET")?;
        let authority = std::env::var(AUTHORITY_ENV).unwrap_or_else(|_| DEFAULT_AUTHORITY.to_string());

        debug!(tenant = %tenant, "requesting azure key vault token");
        let url = format!("{}/{tenant}/oauth2/v2.0/token", authority.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", VAULT_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| format!("token request failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("token request returned HTTP {}", response.status()));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| format!("invalid token response: {e}"))?;
        string_at(&body, "/access_token").map(str::to_string)
    }

    async fn call(&self, op: &str, value: &[u8]) -> Result<Vec<u8>, String> {
        let token = self.bearer().await?;
        let url = format!(
            "{}/keys/{}/{}/{op}?api-version={API_VERSION}",
            self.vault_url, self.name, self.version
        );
        let body = json!({ "alg": ALGORITHM, "value": URL_SAFE_NO_PAD.encode(value) });
        let response = send_json(self.client.post(url).bearer_auth(token), &body).await?;
        let encoded = string_at(&response, "/value")?;
        URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|e| format!("value is not base64url: {e}"))
    }
}

impl fmt::Debug for AzureKvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureKvKey")
            .field("vault_url", &self.vault_url)
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MasterKey for AzureKvKey {
    fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor::AzureKv {
            vault_url: self.vault_url.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    async fn encrypt(&self, data_key: &[u8]) -> KeyResult<Vec<u8>> {
        self.call("wrapkey", data_key)
            .await
            .map_err(|reason| KeyError::Encrypt {
                key: self.descriptor().to_string(),
                reason,
            })
    }

    async fn decrypt(&self, wrapped: &[u8]) -> KeyResult<Vec<u8>> {
        self.call("unwrapkey", wrapped)
            .await
            .map_err(|reason| KeyError::Decrypt {
                key: self.descriptor().to_string(),
                reason,
            })
    }
}
