//! JSON messages exchanged with a remote key service.
//!
//! `POST /v1/encrypt` takes an [`EncryptRequest`] and answers with an
//! [`EncryptResponse`]; `POST /v1/decrypt` takes a [`DecryptRequest`] and
//! answers with a [`DecryptResponse`]. Failures carry an [`ErrorBody`].

use cryptstore_keys::{KeyDescriptor, WrappedKeyRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ENCRYPT_PATH: &str = "/v1/encrypt";
pub const DECRYPT_PATH: &str = "/v1/decrypt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptRequest {
    pub key: KeyDescriptor,
    #[serde(with = "cryptstore_crypto::serde_b64")]
    pub plaintext: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptResponse {
    #[serde(with = "cryptstore_crypto::serde_b64")]
    pub ciphertext: Vec<u8>,
}

/// Key reference as stored in a record: raw type tag plus parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireKey {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptRequest {
    pub key: WireKey,
    #[serde(with = "cryptstore_crypto::serde_b64")]
    pub ciphertext: Vec<u8>,
}

impl From<&WrappedKeyRecord> for DecryptRequest {
    fn from(record: &WrappedKeyRecord) -> Self {
        Self {
            key: WireKey {
                key_type: record.key_type.clone(),
                params: record.params.clone(),
            },
            ciphertext: record.enc.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptResponse {
    #[serde(with = "cryptstore_crypto::serde_b64")]
    pub plaintext: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
