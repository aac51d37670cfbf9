//! AWS KMS keys through the AWS SDK.
//!
//! Credentials come from the standard provider chain (optionally a named
//! profile). When a role is given it is assumed through STS before calling
//! KMS. The region is always taken from the key ARN.

use crate::config::required;
use crate::descriptor::KeyDescriptor;
use crate::error::{KeyError, KeyResult};
use crate::master_key::MasterKey;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::sts::AssumeRoleProvider;
use aws_sdk_kms::error::DisplayErrorContext;
use aws_sdk_kms::primitives::Blob;
use aws_types::region::Region;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

const SESSION_NAME: &str = "cryptstore";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AwsKmsConfig {
    pub arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl AwsKmsConfig {
    pub fn build(&self) -> KeyResult<AwsKmsKey> {
        AwsKmsKey::new(
            &self.arn,
            self.role.clone(),
            self.context.clone(),
            self.profile.clone(),
        )
    }
}

pub struct AwsKmsKey {
    arn: String,
    region: String,
    role: Option<String>,
    context: BTreeMap<String, String>,
    profile: Option<String>,
}

impl AwsKmsKey {
    pub fn new(
        arn: &str,
        role: Option<String>,
        context: BTreeMap<String, String>,
        profile: Option<String>,
    ) -> KeyResult<Self> {
        let arn = required("aws_kms arn", arn)?;
        let region = region_from_arn(&arn)?;
        Ok(Self {
            arn,
            region,
            role: role.filter(|r| !r.trim().is_empty()),
            context,
            profile: profile.filter(|p| !p.trim().is_empty()),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn client(&self) -> aws_sdk_kms::Client {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(self.region.clone()));
        if let Some(profile) = &self.profile {
            loader = loader.profile_name(profile);
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_kms::config::Builder::from(&shared);
        if let Some(role) = &self.role {
            debug!(role = %role, "assuming role for kms access");
            let provider = AssumeRoleProvider::builder(role.clone())
                .session_name(SESSION_NAME)
                .configure(&shared)
                .build()
                .await;
            builder = builder.credentials_provider(provider);
        }
        aws_sdk_kms::Client::from_conf(builder.build())
    }

    fn encryption_context(&self) -> Option<HashMap<String, String>> {
        if self.context.is_empty() {
            return None;
        }
        Some(
            self.context
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

/// Extracts the region from `arn:<partition>:kms:<region>:<account>:key/<id>`.
pub fn region_from_arn(arn: &str) -> KeyResult<String> {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    match parts.as_slice() {
        ["arn", _, "kms", region, _, resource]
            if !region.is_empty() && (resource.starts_with("key/") || resource.starts_with("alias/")) =>
        {
            Ok((*region).to_string())
        }
        _ => Err(KeyError::Config(format!("not a KMS key ARN: {arn}"))),
    }
}

impl fmt::Debug for AwsKmsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsKmsKey")
            .field("arn", &self.arn)
            .field("role", &self.role)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MasterKey for AwsKmsKey {
    fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor::AwsKms {
            arn: self.arn.clone(),
            role: self.role.clone(),
            context: self.context.clone(),
            profile: self.profile.clone(),
        }
    }

    async fn encrypt(&self, data_key: &[u8]) -> KeyResult<Vec<u8>> {
        let failure = |reason: String| KeyError::Encrypt {
            key: self.descriptor().to_string(),
            reason,
        };
        let output = self
            .client()
            .await
            .encrypt()
            .key_id(&self.arn)
            .plaintext(Blob::new(data_key))
            .set_encryption_context(self.encryption_context())
            .send()
            .await
            .map_err(|e| failure(DisplayErrorContext(&e).to_string()))?;

        output
            .ciphertext_blob()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| failure("response carried no ciphertext".to_string()))
    }

    async fn decrypt(&self, wrapped: &[u8]) -> KeyResult<Vec<u8>> {
        let failure = |reason: String| KeyError::Decrypt {
            key: self.descriptor().to_string(),
            reason,
        };
        let output = self
            .client()
            .await
            .decrypt()
            .key_id(&self.arn)
            .ciphertext_blob(Blob::new(wrapped))
            .set_encryption_context(self.encryption_context())
            .send()
            .await
            .map_err(|e| failure(DisplayErrorContext(&e).to_string()))?;

        output
            .plaintext()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| failure("response carried no plaintext".to_string()))
    }
}
