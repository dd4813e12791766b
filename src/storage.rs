//! Blob staging for the remote transcription service.
//!
//! The speech service pulls audio from a URL, so the extracted WAV is
//! uploaded to a blob container and handed over as a SAS-signed read URL.
//! The read SAS must stay valid for the whole transcription job lifetime,
//! which is why the validity window is measured in hours.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

use crate::config::StorageConfig;

/// Object storage collaborator: stages a local file and returns a URL the
/// transcription service can read.
pub trait AudioStore: Send {
    fn stage(&self, path: &Path) -> Result<String>;
}

const SAS_VERSION: &str = "2022-11-02";

/// Azure Blob Storage client. Both the upload and the returned read URL are
/// authorized with service SAS tokens signed by the account key.
pub struct AzureBlobStore {
    account: String,
    access_key: String,
    container: String,
    sas_validity_hours: u64,
    client: reqwest::blocking::Client,
}

impl AzureBlobStore {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let access_key = if !config.access_key.is_empty() {
            config.access_key.clone()
        } else {
            std::env::var("MEDIASCRUB_STORAGE_KEY").context(
                "Storage access key not configured. Set [storage] access_key or MEDIASCRUB_STORAGE_KEY",
            )?
        };

        if config.account.is_empty() {
            anyhow::bail!("Storage account not configured. Set [storage] account in mediascrub.toml");
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()?;

        Ok(Self {
            account: config.account.clone(),
            access_key,
            container: config.container.clone(),
            sas_validity_hours: config.sas_validity_hours,
            client,
        })
    }

    fn blob_url(&self, blob_name: &str) -> String {
        format!(
            "https://{}.blob.core.windows.net/{}/{}",
            self.account, self.container, blob_name
        )
    }

    /// Build a service SAS query string for one blob.
    fn service_sas(
        &self,
        blob_name: &str,
        permissions: &str,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<String> {
        let start_str = start.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let expiry_str = expiry.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let canonicalized_resource =
            format!("/blob/{}/{}/{}", self.account, self.container, blob_name);

        let string_to_sign =
            sas_string_to_sign(permissions, &start_str, &expiry_str, &canonicalized_resource);
        let signature = compute_hmac_sha256(&self.access_key, &string_to_sign)?;

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("sv", SAS_VERSION)
            .append_pair("sp", permissions)
            .append_pair("st", &start_str)
            .append_pair("se", &expiry_str)
            .append_pair("spr", "https")
            .append_pair("sr", "b")
            .append_pair("sig", &signature);
        Ok(query.finish())
    }
}

impl AudioStore for AzureBlobStore {
    fn stage(&self, path: &Path) -> Result<String> {
        let blob_name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("audio path has no filename: {}", path.display()))?
            .to_string_lossy()
            .to_string();

        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read audio file {}", path.display()))?;

        tracing::info!(
            "Uploading {} ({} bytes) to container '{}'",
            blob_name,
            bytes.len(),
            self.container
        );

        let now = Utc::now();
        // Clock skew headroom on the start time.
        let start = now - Duration::minutes(5);

        let upload_sas = self.service_sas(&blob_name, "cw", start, now + Duration::hours(1))?;
        let upload_url = format!("{}?{}", self.blob_url(&blob_name), upload_sas);

        let response = self
            .client
            .put(&upload_url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", SAS_VERSION)
            .header("Content-Type", "audio/wav")
            .body(bytes)
            .send()
            .context("Failed to reach blob storage")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            anyhow::bail!("blob upload returned HTTP {}: {}", status.as_u16(), body);
        }

        let read_sas = self.service_sas(
            &blob_name,
            "r",
            start,
            now + Duration::hours(self.sas_validity_hours as i64),
        )?;
        Ok(format!("{}?{}", self.blob_url(&blob_name), read_sas))
    }
}

/// Service SAS string-to-sign, 2020-12-06+ layout. Sixteen newline-separated
/// fields: permissions, start, expiry, resource, identifier, IP, protocol,
/// version, resource type, snapshot time, encryption scope, then five
/// response header overrides.
fn sas_string_to_sign(permissions: &str, start: &str, expiry: &str, resource: &str) -> String {
    format!(
        "{permissions}\n{start}\n{expiry}\n{resource}\n\n\nhttps\n{version}\nb\n\n\n\n\n\n\n",
        version = SAS_VERSION,
    )
}

/// HMAC-SHA256 over `message` with a base64-encoded key, base64-encoded.
fn compute_hmac_sha256(key_base64: &str, message: &str) -> Result<String> {
    use base64::Engine;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let key_bytes = base64::engine::general_purpose::STANDARD
        .decode(key_base64)
        .context("Invalid base64 storage account key")?;

    let mut mac = Hmac::<Sha256>::new_from_slice(&key_bytes)
        .map_err(|e| anyhow::anyhow!("HMAC key error: {}", e))?;
    mac.update(message.as_bytes());
    let result = mac.finalize();

    Ok(base64::engine::general_purpose::STANDARD.encode(result.into_bytes()))
}
