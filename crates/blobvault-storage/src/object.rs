//! Cloud object storage backend
//!
//! Uses the `object_store` crate to hold one object per digest in an
//! S3-compatible bucket. Enumeration is deliberately unsupported: listing a
//! bucket is not an operation this design leans on.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use tracing::{debug, info};

use crate::digest::Digest;
use crate::error::StoreError;
use crate::spool::Spooled;
use crate::store::{BlobInfo, BlobStore, ByteStream};

/// Upload parts of at least 5 MiB, the S3 multipart minimum.
const MULTIPART_PART_SIZE: usize = 5 * 1024 * 1024;

/// Object store configuration
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// Bucket name
    pub bucket: String,
    /// Region (e.g. "us-east-1")
    pub region: String,
    /// Endpoint URL (for MinIO or other S3-compatible services)
    pub endpoint: Option<String>,
    /// Access key ID
    pub access_key_id: Option<String>,
    /// Secret access key
    pub secret_access_key: Option<String>,
    /// Allow HTTP (not HTTPS) connections
    pub allow_http: bool,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            bucket: "blobvault".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            allow_http: false,
        }
    }
}

/// Cloud object storage backend: one object per digest, key = digest.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBackend {
    pub fn new(config: ObjectStoreConfig) -> Result<Self, StoreError> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(access_key) = &config.access_key_id {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret_key);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| StoreError::ObjectStore(format!("failed to create client: {}", e)))?;

        info!(
            "Initialized object store backend: bucket={}, region={}, endpoint={:?}",
            config.bucket, config.region, config.endpoint
        );

        Ok(Self {
            store: Arc::new(store),
        })
    }

    /// Wrap an already-built `ObjectStore` (used by tests with the in-memory
    /// provider).
    pub fn from_store(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn object_path(digest: &Digest) -> ObjectPath {
        ObjectPath::from(digest.as_str())
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBackend {
    async fn open(&self, digest: &Digest) -> Result<ByteStream, StoreError> {
        let path = Self::object_path(digest);
        debug!("Streaming blob from object store: {:?}", path);

        let result = self.store.get(&path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => StoreError::NotFound(digest.clone()),
            _ => StoreError::ObjectStore(e.to_string()),
        })?;

        Ok(Box::pin(
            result
                .into_stream()
                .map_err(|e| StoreError::ObjectStore(e.to_string())),
        ))
    }

    async fn add(&self, blob: &Spooled) -> Result<BlobInfo, StoreError> {
        let info = blob.info().clone();
        let path = Self::object_path(&info.digest);
        debug!("Writing blob to object store: {:?}", path);

        // Multipart keeps memory bounded for spilled payloads.
        let mut upload = self
            .store
            .put_multipart(&path)
            .await
            .map_err(|e| StoreError::ObjectStore(format!("failed to start upload: {}", e)))?;

        let mut src = blob.stream().await?;
        let mut buffer = Vec::with_capacity(MULTIPART_PART_SIZE);
        while let Some(chunk) = src.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);
            if buffer.len() >= MULTIPART_PART_SIZE {
                upload
                    .put_part(PutPayload::from(Bytes::from(std::mem::take(&mut buffer))))
                    .await
                    .map_err(|e| StoreError::ObjectStore(format!("failed to upload part: {}", e)))?;
                buffer = Vec::with_capacity(MULTIPART_PART_SIZE);
            }
        }
        if !buffer.is_empty() {
            upload
                .put_part(PutPayload::from(Bytes::from(buffer)))
                .await
                .map_err(|e| StoreError::ObjectStore(format!("failed to upload part: {}", e)))?;
        }
        upload
            .complete()
            .await
            .map_err(|e| StoreError::ObjectStore(format!("failed to complete upload: {}", e)))?;

        Ok(info)
    }

    async fn has(&self, digest: &Digest) -> Result<bool, StoreError> {
        match self.store.head(&Self::object_path(digest)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StoreError::ObjectStore(e.to_string())),
        }
    }

    async fn get_info(&self, digest: &Digest) -> Result<Option<BlobInfo>, StoreError> {
        match self.store.head(&Self::object_path(digest)).await {
            Ok(meta) => Ok(Some(BlobInfo {
                digest: digest.clone(),
                content_length: meta.size as u64,
            })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(StoreError::ObjectStore(e.to_string())),
        }
    }

    async fn delete(&self, digest: &Digest) -> Result<(), StoreError> {
        match self.store.delete(&Self::object_path(digest)).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(StoreError::ObjectStore(e.to_string())),
        }
    }

    async fn iter(&self) -> Result<Vec<Digest>, StoreError> {
        Err(StoreError::Unsupported("iter"))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("clear"))
    }
}
