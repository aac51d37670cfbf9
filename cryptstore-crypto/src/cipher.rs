//! ChaCha20-Poly1305 encryption of individual values under a data key.
//!
//! Every call uses a fresh random nonce. Callers bind ciphertext to its
//! location with `aad`; decrypting with different associated data fails
//! authentication.

use crate::error::{CryptoError, CryptoResult};
use crate::key::DataKey;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::{Deserialize, Serialize};

/// ChaCha20-Poly1305 nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Nonce plus ciphertext (with appended tag).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    #[serde(with = "crate::serde_b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "crate::serde_b64")]
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    pub fn new(nonce: Vec<u8>, ciphertext: Vec<u8>) -> Self {
        Self { nonce, ciphertext }
    }
}

/// Encrypts `plaintext` under `key`, authenticating `aad` alongside it.
pub fn encrypt(key: &DataKey, plaintext: &[u8], aad: &[u8]) -> CryptoResult<EncryptedData> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|e| CryptoError::Encryption(format!("aead seal failed: {e}")))?;

    Ok(EncryptedData {
        nonce: nonce.to_vec(),
        ciphertext,
    })
}

/// Decrypts data produced by [`encrypt`] with the same key and `aad`.
pub fn decrypt(key: &DataKey, data: &EncryptedData, aad: &[u8]) -> CryptoResult<Vec<u8>> {
    if data.nonce.len() != NONCE_SIZE {
        return Err(CryptoError::Decryption(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            data.nonce.len()
        )));
    }
    if data.ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::Decryption(
            "ciphertext shorter than authentication tag".to_string(),
        ));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            Nonce::from_slice(&data.nonce),
            Payload {
                msg: &data.ciphertext,
                aad,
            },
        )
        .map_err(|_| {
            CryptoError::Decryption("authentication failed (wrong key or tampered data)".to_string())
        })
}
