//! In-database blob backend

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;

use blobvault_storage::{BlobInfo, BlobStore, ByteStream, Digest, Spooled, StoreError};

use crate::repository::{contents, Database};

/// Blob backend that keeps content in the `blob_contents` table.
///
/// Used as the "small" half of the size-tiered store: for blobs under the
/// tier threshold a row fetch beats a filesystem round trip. `open`
/// materializes the content into memory, which is fine at these sizes.
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BlobStore for DatabaseStore {
    async fn open(&self, digest: &Digest) -> Result<ByteStream, StoreError> {
        let mut conn = self.db.acquire().await?;
        let content = contents::open(&mut conn, digest.as_str())
            .await?
            .ok_or_else(|| StoreError::NotFound(digest.clone()))?;
        let data = Bytes::from(content);
        Ok(Box::pin(stream::once(async move { Ok(data) })))
    }

    async fn add(&self, blob: &Spooled) -> Result<BlobInfo, StoreError> {
        let info = blob.info().clone();
        let data = blob.bytes().await?;
        let mut conn = self.db.acquire().await?;
        contents::insert_if_absent(
            &mut conn,
            info.digest.as_str(),
            &data,
            info.content_length as i64,
        )
        .await?;
        Ok(info)
    }

    async fn has(&self, digest: &Digest) -> Result<bool, StoreError> {
        let mut conn = self.db.acquire().await?;
        Ok(contents::has(&mut conn, digest.as_str()).await?)
    }

    async fn get_info(&self, digest: &Digest) -> Result<Option<BlobInfo>, StoreError> {
        let mut conn = self.db.acquire().await?;
        let length = contents::content_length(&mut conn, digest.as_str()).await?;
        Ok(length.map(|content_length| BlobInfo {
            digest: digest.clone(),
            content_length: content_length as u64,
        }))
    }

    async fn delete(&self, digest: &Digest) -> Result<(), StoreError> {
        let mut conn = self.db.acquire().await?;
        contents::delete(&mut conn, digest.as_str()).await?;
        Ok(())
    }

    async fn iter(&self) -> Result<Vec<Digest>, StoreError> {
        let mut conn = self.db.acquire().await?;
        contents::iter(&mut conn)
            .await?
            .into_iter()
            .map(|d| {
                d.parse::<Digest>()
                    .map_err(|e| StoreError::Database(e.to_string()))
            })
            .collect()
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut conn = self.db.acquire().await?;
        contents::clear(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn round_trip_and_idempotent_add() {
        let db = Database::new_in_memory().await.unwrap();
        let store = DatabaseStore::new(db);

        let blob = Spooled::from_bytes(&b"row bytes"[..]);
        let info = store.add(&blob).await.unwrap();
        let again = store.add(&blob).await.unwrap();
        assert_eq!(info, again);

        assert!(store.has(&info.digest).await.unwrap());
        assert_eq!(
            store.get_info(&info.digest).await.unwrap(),
            Some(info.clone())
        );
        assert_eq!(collect(store.open(&info.digest).await.unwrap()).await, b"row bytes");
        assert_eq!(store.iter().await.unwrap(), vec![info.digest.clone()]);

        store.delete(&info.digest).await.unwrap();
        assert!(!store.has(&info.digest).await.unwrap());
        store.delete(&info.digest).await.unwrap();
    }
}
