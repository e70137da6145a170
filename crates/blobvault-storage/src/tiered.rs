//! Size-tiered store composition

use async_trait::async_trait;
use std::sync::Arc;

use crate::digest::Digest;
use crate::error::StoreError;
use crate::spool::Spooled;
use crate::store::{BlobInfo, BlobStore, ByteStream};

/// Default split point between the small and big halves (1 MiB).
pub const DEFAULT_THRESHOLD: u64 = 1024 * 1024;

/// Routes blobs to one of two inner stores by content length: payloads of
/// at most `threshold` bytes go to `small`, the rest to `big`. Because
/// routing is a pure function of the length, a digest never appears in both
/// halves.
pub struct SizeTieredStore {
    small: Arc<dyn BlobStore>,
    big: Arc<dyn BlobStore>,
    threshold: u64,
}

impl SizeTieredStore {
    pub fn new(small: Arc<dyn BlobStore>, big: Arc<dyn BlobStore>, threshold: u64) -> Self {
        Self {
            small,
            big,
            threshold,
        }
    }
}

#[async_trait]
impl BlobStore for SizeTieredStore {
    async fn open(&self, digest: &Digest) -> Result<ByteStream, StoreError> {
        if self.small.has(digest).await? {
            self.small.open(digest).await
        } else if self.big.has(digest).await? {
            self.big.open(digest).await
        } else {
            Err(StoreError::NotFound(digest.clone()))
        }
    }

    async fn add(&self, blob: &Spooled) -> Result<BlobInfo, StoreError> {
        if blob.content_length() <= self.threshold {
            self.small.add(blob).await
        } else {
            self.big.add(blob).await
        }
    }

    async fn has(&self, digest: &Digest) -> Result<bool, StoreError> {
        Ok(self.small.has(digest).await? || self.big.has(digest).await?)
    }

    async fn get_info(&self, digest: &Digest) -> Result<Option<BlobInfo>, StoreError> {
        if let Some(info) = self.small.get_info(digest).await? {
            return Ok(Some(info));
        }
        self.big.get_info(digest).await
    }

    async fn delete(&self, digest: &Digest) -> Result<(), StoreError> {
        if self.small.has(digest).await? {
            self.small.delete(digest).await?;
        }
        if self.big.has(digest).await? {
            self.big.delete(digest).await?;
        }
        Ok(())
    }

    async fn iter(&self) -> Result<Vec<Digest>, StoreError> {
        let mut digests = self.small.iter().await?;
        digests.extend(self.big.iter().await?);
        Ok(digests)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.small.clear().await?;
        self.big.clear().await
    }
}
