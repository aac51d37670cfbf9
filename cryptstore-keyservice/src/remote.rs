//! HTTP/JSON client for an out-of-process key service.
//!
//! The connection is opened once by [`RemoteKeyService::connect`] and
//! closed once by [`RemoteKeyService::close`]. Calls made after close fail
//! with [`ServiceError::Closed`].

use crate::error::{ServiceError, ServiceResult};
use crate::service::KeyService;
use crate::wire::{
    DECRYPT_PATH, DecryptRequest, DecryptResponse, ENCRYPT_PATH, EncryptRequest, EncryptResponse,
    ErrorBody,
};
use async_trait::async_trait;
use cryptstore_keys::{KeyDescriptor, WrappedKeyRecord};
use reqwest::{Client, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub struct RemoteKeyService {
    address: Url,
    client: RwLock<Option<Client>>,
}

impl RemoteKeyService {
    /// Validates `address` and opens the client.
    pub fn connect(address: &str) -> ServiceResult<Self> {
        let mut address = Url::parse(address.trim())
            .map_err(|e| ServiceError::Config(format!("invalid key service address {address:?}: {e}")))?;
        if !matches!(address.scheme(), "http" | "https") {
            return Err(ServiceError::Config(format!(
                "key service address must be http or https, got {}",
                address.scheme()
            )));
        }
        if address.host_str().is_none() {
            return Err(ServiceError::Config(format!(
                "key service address has no host: {address}"
            )));
        }

        if !address.path().ends_with('/') {
            let path = format!("{}/", address.path());
            address.set_path(&path);
        }

        let client = Client::builder()
            .build()
            .map_err(|e| ServiceError::Config(format!("failed to build HTTP client: {e}")))?;

        info!(address = %address, "connected to remote key service");
        Ok(Self {
            address,
            client: RwLock::new(Some(client)),
        })
    }

    pub fn address(&self) -> &Url {
        &self.address
    }

    /// Closes the connection. Returns false if it was already closed.
    pub async fn close(&self) -> bool {
        let closed = self.client.write().await.take().is_some();
        if closed {
            info!(address = %self.address, "closed remote key service connection");
        }
        closed
    }

    pub async fn is_closed(&self) -> bool {
        self.client.read().await.is_none()
    }

    async fn post<Req, Resp>(&self, path: &str, request: &Req) -> ServiceResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let client = self.client.read().await.clone().ok_or(ServiceError::Closed)?;
        let url = self
            .address
            .join(path.trim_start_matches('/'))
            .map_err(|e| ServiceError::Protocol(format!("invalid request path {path}: {e}")))?;

        debug!(url = %url, "key service request");
        let response = client.post(url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(ServiceError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ServiceError::Protocol(format!("invalid response body: {e}")))
    }
}

impl std::fmt::Debug for RemoteKeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteKeyService")
            .field("address", &self.address.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyService for RemoteKeyService {
    async fn encrypt(&self, key: &KeyDescriptor, data_key: &[u8]) -> ServiceResult<Vec<u8>> {
        let request = EncryptRequest {
            key: key.clone(),
            plaintext: data_key.to_vec(),
        };
        let response: EncryptResponse = self.post(ENCRYPT_PATH, &request).await?;
        Ok(response.ciphertext)
    }

    async fn decrypt(&self, record: &WrappedKeyRecord) -> ServiceResult<Vec<u8>> {
        let request = DecryptRequest::from(record);
        let response: DecryptResponse = self.post(DECRYPT_PATH, &request).await?;
        Ok(response.plaintext)
    }
}
