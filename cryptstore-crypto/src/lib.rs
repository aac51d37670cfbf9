//! Cryptographic building blocks for cryptstore.
//!
//! Provides:
//! - ChaCha20-Poly1305 for authenticated encryption of document leaves
//! - Random per-write data keys with zeroization
//! - N-of-N XOR splitting of a data key across key groups
//!
//! # Architecture
//!
//! Every write generates a fresh **data key**. The data key encrypts the
//! document leaves and never leaves memory in cleartext; master keys only
//! ever see the data key (or one share of it) when wrapping it.
//!
//! When more than one key group protects a document the data key is split
//! into one share per group. All shares are required to rebuild the key,
//! which is what gives key groups their AND semantics.

mod cipher;
mod error;
mod key;
pub mod serde_b64;

pub use cipher::{decrypt, encrypt, EncryptedData, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::{combine_shares, split_key, DataKey, KEY_SIZE};
