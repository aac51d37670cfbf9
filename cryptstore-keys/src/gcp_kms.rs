//! Google Cloud KMS crypto keys, called over the REST API.

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
use serde_json::{Value, json};
use std::fmt;

pub const DEFAULT_ENDPOINT: &str = "https://cloudkms.googleapis.com";
pub const TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

#[derive(Clone, Serialize, Deserialize)]
pub struct GcpKmsConfig {
    pub resource_id: String,
    /// JSON object, or a string holding one, with an `access_token` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl fmt::Debug for GcpKmsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpKmsConfig")
            .field("resource_id", &self.resource_id)
            .field("credentials", &self.credentials.as_ref().map(|_| "[REDACTED]"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl GcpKmsConfig {
    pub fn build(&self) -> KeyResult<GcpKmsKey> {
        let access_token = match &self.credentials {
            None => None,
            Some(credentials) => Some(access_token_from(credentials)?),
        };
        GcpKmsKey::new(&self.resource_id, access_token, self.endpoint.as_deref())
    }
}

fn access_token_from(credentials: &Value) -> KeyResult<String> {
    let parsed;
    let object = match credentials {
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text)
                .map_err(|e| KeyError::Config(format!("gcp_kms credentials are not JSON: {e}")))?;
            &parsed
        }
        other => other,
    };
    object
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            KeyError::Config("gcp_kms credentials must carry an access_token".to_string())
        })
}

pub struct GcpKmsKey {
    resource_id: String,
    access_token: Option<String>,
    endpoint: String,
    client: Client,
}

impl GcpKmsKey {
    pub fn new(
        resource_id: &str,
        access_token: Option<String>,
        endpoint: Option<&str>,
    ) -> KeyResult<Self> {
        let resource_id = required("gcp_kms resource_id", resource_id)?;
        let endpoint = endpoint
            .map(|e| expand_placeholders(e.trim()))
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            resource_id,
            access_token,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: Client::new(),
        })
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    fn token(&self) -> Result<String, String> {
        self.access_token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()))
            .ok_or_else(|| format!("no access token configured and {TOKEN_ENV} is unset"))
    }

    async fn call(&self, op: &str, body: Value, field: &str) -> Result<Vec<u8>, String> {
        let token = self.token()?;
        let url = format!("{}/v1/{}:{op}", self.endpoint, self.resource_id);
        let response = send_json(self.client.post(url).bearer_auth(token), &body).await?;
        let encoded = string_at(&response, &format!("/{field}"))?;
        STANDARD
            .decode(encoded)
            .map_err(|e| format!("{field} is not base64: {e}"))
    }
}

impl fmt::Debug for GcpKmsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpKmsKey")
            .field("resource_id", &self.resource_id)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MasterKey for GcpKmsKey {
    fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor::GcpKms {
            resource_id: self.resource_id.clone(),
        }
    }

    async fn encrypt(&self, data_key: &[u8]) -> KeyResult<Vec<u8>> {
        self.call("encrypt", json!({ "plaintext": STANDARD.encode(data_key) }), "ciphertext")
            .await
            .map_err(|reason| KeyError::Encrypt {
                key: self.descriptor().to_string(),
                reason,
            })
    }

    async fn decrypt(&self, wrapped: &[u8]) -> KeyResult<Vec<u8>> {
        self.call("decrypt", json!({ "ciphertext": STANDARD.encode(wrapped) }), "plaintext")
            .await
            .map_err(|reason| KeyError::Decrypt {
                key: self.descriptor().to_string(),
                reason,
            })
    }
}
