//! Per-write data keys.

use crate::error::{CryptoError, CryptoResult};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a data key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Symmetric data key that encrypts document leaves.
///
/// Generated fresh for every store, recovered once per load, and wiped from
/// memory when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; KEY_SIZE]);

impl DataKey {
    /// Generates a random data key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Builds a key from an unwrapped byte slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}

/// Splits `key` into `parts` shares whose XOR is the original key.
///
/// Every share is required to rebuild the key. With a single part the only
/// share is the key itself.
pub fn split_key(key: &DataKey, parts: usize) -> CryptoResult<Vec<DataKey>> {
    if parts == 0 {
        return Err(CryptoError::Encryption(
            "cannot split a data key into zero shares".to_string(),
        ));
    }

    let mut shares = Vec::with_capacity(parts);
    let mut last = *key.as_bytes();
    for _ in 1..parts {
        let share = DataKey::generate();
        for (acc, b) in last.iter_mut().zip(share.as_bytes()) {
            *acc ^= b;
        }
        shares.push(share);
    }
    shares.push(DataKey(last));
    last.zeroize();
    Ok(shares)
}

/// Rebuilds a data key from all of its shares.
pub fn combine_shares(shares: &[DataKey]) -> CryptoResult<DataKey> {
    if shares.is_empty() {
        return Err(CryptoError::Decryption(
            "no key shares to combine".to_string(),
        ));
    }

    let mut key = [0u8; KEY_SIZE];
    for share in shares {
        for (acc, b) in key.iter_mut().zip(share.as_bytes()) {
            *acc ^= b;
        }
    }
    let combined = DataKey(key);
    key.zeroize();
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        assert_ne!(DataKey::generate(), DataKey::generate());
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        let err = DataKey::from_slice(&[0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKeyLength { expected: 32, actual: 16 }
        ));
    }

    #[test]
    fn single_share_is_the_key() {
        let key = DataKey::generate();
        let shares = split_key(&key, 1).unwrap();
        assert_eq!(shares, vec![key]);
    }

    #[test]
    fn all_shares_rebuild_the_key() {
        let key = DataKey::generate();
        let shares = split_key(&key, 4).unwrap();
        assert_eq!(shares.len(), 4);
        assert_eq!(combine_shares(&shares).unwrap(), key);
    }

    #[test]
    fn missing_share_does_not_rebuild_the_key() {
        let key = DataKey::generate();
        let shares = split_key(&key, 3).unwrap();
        assert_ne!(combine_shares(&shares[..2]).unwrap(), key);
    }

    #[test]
    fn zero_parts_is_rejected() {
        assert!(split_key(&DataKey::generate(), 0).is_err());
        assert!(combine_shares(&[]).is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let key = DataKey::from_slice(&[7u8; KEY_SIZE]).unwrap();
        assert_eq!(format!("{key:?}"), "DataKey([REDACTED])");
    }
}
