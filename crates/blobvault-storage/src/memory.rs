//! In-memory blob backend

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::digest::Digest;
use crate::error::StoreError;
use crate::spool::Spooled;
use crate::store::{BlobInfo, BlobStore, ByteStream};

/// In-memory blob backend: a map from digest to bytes.
///
/// Intended for tests and for small caches. Blobs larger than
/// `max_blob_size` are rejected rather than silently held.
pub struct InMemoryStore {
    blobs: Mutex<HashMap<Digest, Bytes>>,
    max_blob_size: Option<u64>,
}

impl InMemoryStore {
    pub fn new(max_blob_size: Option<u64>) -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            max_blob_size,
        }
    }

    /// Total bytes currently held.
    pub fn total_size(&self) -> u64 {
        self.blobs.lock().values().map(|b| b.len() as u64).sum()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl BlobStore for InMemoryStore {
    async fn open(&self, digest: &Digest) -> Result<ByteStream, StoreError> {
        let data = self
            .blobs
            .lock()
            .get(digest)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(digest.clone()))?;
        Ok(Box::pin(stream::once(async move { Ok(data) })))
    }

    async fn add(&self, blob: &Spooled) -> Result<BlobInfo, StoreError> {
        let info = blob.info().clone();
        if let Some(limit) = self.max_blob_size {
            if info.content_length > limit {
                return Err(StoreError::TooLarge {
                    size: info.content_length,
                    limit,
                });
            }
        }
        let data = blob.bytes().await?;
        self.blobs.lock().entry(info.digest.clone()).or_insert(data);
        Ok(info)
    }

    async fn has(&self, digest: &Digest) -> Result<bool, StoreError> {
        Ok(self.blobs.lock().contains_key(digest))
    }

    async fn get_info(&self, digest: &Digest) -> Result<Option<BlobInfo>, StoreError> {
        Ok(self.blobs.lock().get(digest).map(|data| BlobInfo {
            digest: digest.clone(),
            content_length: data.len() as u64,
        }))
    }

    async fn delete(&self, digest: &Digest) -> Result<(), StoreError> {
        self.blobs.lock().remove(digest);
        Ok(())
    }

    async fn iter(&self) -> Result<Vec<Digest>, StoreError> {
        Ok(self.blobs.lock().keys().cloned().collect())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.blobs.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn round_trip() {
        let store = InMemoryStore::default();
        let info = store.add(&Spooled::from_bytes(&b"mem"[..])).await.unwrap();
        let mut s = store.open(&info.digest).await.unwrap();
        let chunk = s.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"mem");
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn rejects_oversized_blob() {
        let store = InMemoryStore::new(Some(4));
        let err = store
            .add(&Spooled::from_bytes(&b"too big"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TooLarge { size: 7, limit: 4 }));
    }
}
