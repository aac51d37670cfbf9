//! PGP keys, driven through the `gpg` executable.

use crate::descriptor::KeyDescriptor;
use crate::error::{KeyError, KeyResult};
use crate::master_key::MasterKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub const GPG_EXEC_ENV: &str = "CRYPTSTORE_GPG_EXEC";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PgpConfig {
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gnupg_home: Option<String>,
}

impl PgpConfig {
    pub fn build(&self) -> KeyResult<PgpKey> {
        PgpKey::new(&self.fingerprint, self.gnupg_home.clone())
    }
}

#[derive(Debug)]
pub struct PgpKey {
    fingerprint: String,
    gnupg_home: Option<String>,
}

impl PgpKey {
    pub fn new(fingerprint: &str, gnupg_home: Option<String>) -> KeyResult<Self> {
        Ok(Self {
            fingerprint: normalize_fingerprint(fingerprint)?,
            gnupg_home,
        })
    }

    async fn gpg(&self, args: &[&str], input: &[u8]) -> Result<Vec<u8>, String> {
        let binary = std::env::var(GPG_EXEC_ENV).unwrap_or_else(|_| "gpg".to_string());
        let mut command = Command::new(&binary);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(home) = &self.gnupg_home {
            command.env("GNUPGHOME", home);
        }

        let mut child = command
            .spawn()
            .map_err(|e| format!("failed to run {binary}: {e}"))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .await
                .map_err(|e| format!("failed to write to {binary}: {e}"))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("{binary} did not finish: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("{binary} exited with {}: {}", output.status, stderr.trim()));
        }
        Ok(output.stdout)
    }
}

/// Strips whitespace, uppercases, and checks a 16 to 40 hex character id.
pub fn normalize_fingerprint(fingerprint: &str) -> KeyResult<String> {
    let normalized: String = fingerprint
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    if !(16..=40).contains(&normalized.len()) || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(KeyError::Config(format!(
            "pgp fingerprint must be 16 to 40 hex characters: {fingerprint:?}"
        )));
    }
    Ok(normalized)
}

#[async_trait]
impl MasterKey for PgpKey {
    fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor::Pgp {
            fingerprint: self.fingerprint.clone(),
        }
    }

    async fn encrypt(&self, data_key: &[u8]) -> KeyResult<Vec<u8>> {
        let key_id = &self.fingerprint[self.fingerprint.len() - 16..];
        let args = [
            "--batch",
            "--no-default-recipient",
            "--yes",
            "--encrypt",
            "--armor",
            "--recipient",
            self.fingerprint.as_str(),
            "--trusted-key",
            key_id,
            "--no-encrypt-to",
        ];
        self.gpg(&args, data_key)
            .await
            .map_err(|reason| KeyError::Encrypt {
                key: self.descriptor().to_string(),
                reason,
            })
    }

    async fn decrypt(&self, wrapped: &[u8]) -> KeyResult<Vec<u8>> {
        self.gpg(&["--batch", "--use-agent", "--decrypt"], wrapped)
            .await
            .map_err(|reason| KeyError::Decrypt {
                key: self.descriptor().to_string(),
                reason,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_normalized() {
        assert_eq!(
            normalize_fingerprint("85d7 7543 b3d6 24b6 3cea 9e6d bc17 301b 491b 3f21").unwrap(),
            "85D77543B3D624B63CEA9E6DBC17301B491B3F21"
        );
    }

    #[test]
    fn bad_fingerprints_are_rejected() {
        assert!(normalize_fingerprint("abc").is_err());
        assert!(normalize_fingerprint(&"Z".repeat(40)).is_err());
        assert!(normalize_fingerprint(&"A".repeat(41)).is_err());
    }
}
