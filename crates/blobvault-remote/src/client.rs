//! Remote blobvault client
//!
//! Translates the blob store contract onto the wire protocol of another
//! blobvault server. Downloads are spooled and re-verified against the
//! requested digest before any bytes are handed to the caller, so a
//! corrupted or truncated transfer surfaces as an integrity error instead
//! of poisoning a cache.

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use blobvault_storage::{BlobInfo, BlobStore, ByteStream, Digest, Spooled, StoreError};

use crate::error::RemoteError;

/// Remote server configuration
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the remote blobvault server
    pub base_url: String,
    /// API key presented as the bearer credential
    pub api_key: Option<String>,
    /// Deadline for control operations (info, delete). Bulk transfers run
    /// without a total deadline.
    pub control_timeout: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            control_timeout: Duration::from_secs(30),
        }
    }
}

/// Wire shape of `GET /blob/{digest}/info`.
#[derive(Debug, Deserialize)]
struct InfoResponse {
    digest: Digest,
    content_length: u64,
}

/// Blob backend on a remote blobvault server.
pub struct RemoteStore {
    config: RemoteConfig,
    client: Client,
}

impl RemoteStore {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let client = Client::builder().build()?;
        info!("Created remote blob client for {}", config.base_url);
        Ok(Self { config, client })
    }

    fn blob_url(&self, digest: &Digest) -> String {
        format!(
            "{}/blob/{}",
            self.config.base_url.trim_end_matches('/'),
            digest
        )
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn fetch_info(&self, digest: &Digest) -> Result<Option<BlobInfo>, RemoteError> {
        let url = format!("{}/info", self.blob_url(digest));
        let response = self
            .authorized(self.client.get(&url))
            .timeout(self.config.control_timeout)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Unauthorized),
            status if status.is_success() => {
                let info: InfoResponse = response.json().await?;
                Ok(Some(BlobInfo {
                    digest: info.digest,
                    content_length: info.content_length,
                }))
            }
            status => Err(RemoteError::Unexpected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl BlobStore for RemoteStore {
    /// Download to a spool, then re-verify length and digest. Bad bytes
    /// never leave this method.
    async fn open(&self, digest: &Digest) -> Result<ByteStream, StoreError> {
        let info = self
            .fetch_info(digest)
            .await
            .map_err(StoreError::from)?
            .ok_or_else(|| StoreError::NotFound(digest.clone()))?;

        debug!("Downloading blob {} ({} bytes)", digest, info.content_length);
        let response = self
            .authorized(self.client.get(self.blob_url(digest)))
            .send()
            .await
            .map_err(RemoteError::from)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(digest.clone()));
        }
        if !response.status().is_success() {
            return Err(RemoteError::Unexpected {
                status: response.status().as_u16(),
                message: String::new(),
            }
            .into());
        }

        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map_err(|e| StoreError::Remote(e.to_string())),
        );
        let spooled = Spooled::from_stream(body).await?;

        if spooled.content_length() != info.content_length {
            return Err(StoreError::Integrity(format!(
                "content length mismatch for {}: expected {}, got {}",
                digest,
                info.content_length,
                spooled.content_length()
            )));
        }
        if spooled.digest() != digest {
            return Err(StoreError::Integrity(format!(
                "digest mismatch: expected {}, got {}",
                digest,
                spooled.digest()
            )));
        }
        spooled.stream().await
    }

    async fn add(&self, blob: &Spooled) -> Result<BlobInfo, StoreError> {
        let info = blob.info().clone();
        if self.has(&info.digest).await? {
            debug!("Blob {} already uploaded", info.digest);
            return Ok(info);
        }

        debug!("Uploading blob {} ({} bytes)", info.digest, info.content_length);
        let body = reqwest::Body::wrap_stream(blob.stream().await?);
        let response = self
            .authorized(self.client.put(self.blob_url(&info.digest)))
            .header(reqwest::header::CONTENT_LENGTH, info.content_length)
            .body(body)
            .send()
            .await
            .map_err(RemoteError::from)?;

        match response.status() {
            status if status.is_success() => Ok(info),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(RemoteError::Unauthorized.into())
            }
            status => Err(RemoteError::Unexpected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }
            .into()),
        }
    }

    async fn has(&self, digest: &Digest) -> Result<bool, StoreError> {
        Ok(self.fetch_info(digest).await.map_err(StoreError::from)?.is_some())
    }

    async fn get_info(&self, digest: &Digest) -> Result<Option<BlobInfo>, StoreError> {
        Ok(self.fetch_info(digest).await?)
    }

    async fn delete(&self, digest: &Digest) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.delete(self.blob_url(digest)))
            .timeout(self.config.control_timeout)
            .send()
            .await
            .map_err(RemoteError::from)?;

        match response.status() {
            // Absent remotely is fine: delete is idempotent.
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(RemoteError::Unauthorized.into())
            }
            status => Err(RemoteError::Unexpected {
                status: status.as_u16(),
                message: String::new(),
            }
            .into()),
        }
    }

    async fn iter(&self) -> Result<Vec<Digest>, StoreError> {
        Err(StoreError::Unsupported("iter"))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("clear"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobvault_storage::digest_bytes;

    #[test]
    fn blob_url_joins_cleanly() {
        let store = RemoteStore::new(RemoteConfig::new("https://blobs.example.com/")).unwrap();
        let digest = digest_bytes(b"x");
        assert_eq!(
            store.blob_url(&digest),
            format!("https://blobs.example.com/blob/{}", digest)
        );
    }
}
