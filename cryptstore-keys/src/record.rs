//! Wrapped data key records persisted in encryption metadata.

use crate::descriptor::{KeyDescriptor, KeyKind};
use crate::error::{KeyError, KeyResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One master key's wrapping of a data key (or of a group's key share).
///
/// The type tag is kept raw so that records written by unknown key types,
/// or records that lost their tag, still deserialize and fail at dispatch
/// with a precise error instead of at decode time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WrappedKeyRecord {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
    #[serde(with = "cryptstore_crypto::serde_b64")]
    pub enc: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl WrappedKeyRecord {
    pub fn new(descriptor: &KeyDescriptor, enc: Vec<u8>) -> KeyResult<Self> {
        let mut params = match serde_json::to_value(descriptor) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(KeyError::InvalidDescriptor(format!(
                    "descriptor serialized to {other}"
                )));
            }
            Err(e) => return Err(KeyError::InvalidDescriptor(e.to_string())),
        };
        params.remove("type");

        Ok(Self {
            key_type: Some(descriptor.kind().as_str().to_string()),
            params,
            enc,
            created_at: Utc::now(),
        })
    }

    /// Parses the type tag.
    pub fn kind(&self) -> KeyResult<KeyKind> {
        match self.key_type.as_deref() {
            None | Some("") => Err(KeyError::MissingKey),
            Some(tag) => tag.parse(),
        }
    }

    /// Rebuilds the descriptor that produced this record.
    pub fn descriptor(&self) -> KeyResult<KeyDescriptor> {
        let kind = self.kind()?;
        let mut object = self.params.clone();
        object.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        serde_json::from_value(Value::Object(object))
            .map_err(|e| KeyError::InvalidDescriptor(format!("{kind}: {e}")))
    }
}
