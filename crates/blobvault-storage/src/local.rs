//! Local disk blob backend

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::digest::{Digest, CHUNK_SIZE};
use crate::error::StoreError;
use crate::spool::Spooled;
use crate::store::{BlobInfo, BlobStore, ByteStream};

/// Local disk blob backend.
///
/// One read-only file per digest, directly under the root directory with the
/// file name equal to the digest. Writes go to a temporary file in the same
/// directory and are atomically renamed into place, so concurrent adds of
/// the same digest resolve to a single final file and readers never observe
/// partial content.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub async fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        info!("Initialized local blob store at {:?}", root);
        Ok(Self { root })
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root.join(digest.as_str())
    }
}

#[async_trait]
impl BlobStore for LocalFileStore {
    async fn open(&self, digest: &Digest) -> Result<ByteStream, StoreError> {
        let path = self.blob_path(digest);
        debug!("Opening blob at {:?}", path);

        let file = File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(digest.clone())
            } else {
                StoreError::Io(e)
            }
        })?;
        Ok(Box::pin(
            ReaderStream::with_capacity(file, CHUNK_SIZE).map_err(StoreError::Io),
        ))
    }

    async fn add(&self, blob: &Spooled) -> Result<BlobInfo, StoreError> {
        let info = blob.info().clone();
        let path = self.blob_path(&info.digest);
        if fs::try_exists(&path).await? {
            return Ok(info);
        }
        debug!("Writing blob to {:?}", path);

        // Unique temp name so concurrent adds of one digest don't clobber
        // each other's partial writes; the rename is atomic either way.
        let tmp_path = self
            .root
            .join(format!(".{}.{}", info.digest, Uuid::new_v4().simple()));
        let mut file = File::create(&tmp_path).await?;
        let mut src = blob.stream().await?;
        while let Some(chunk) = src.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        drop(file);

        fs::rename(&tmp_path, &path).await?;

        // Stored blobs are immutable.
        let mut perms = fs::metadata(&path).await?.permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).await?;

        Ok(info)
    }

    async fn has(&self, digest: &Digest) -> Result<bool, StoreError> {
        Ok(fs::try_exists(self.blob_path(digest)).await?)
    }

    async fn get_info(&self, digest: &Digest) -> Result<Option<BlobInfo>, StoreError> {
        match fs::metadata(self.blob_path(digest)).await {
            Ok(meta) => Ok(Some(BlobInfo {
                digest: digest.clone(),
                content_length: meta.len(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn delete(&self, digest: &Digest) -> Result<(), StoreError> {
        let path = self.blob_path(digest);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted local blob {}", digest);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn iter(&self) -> Result<Vec<Digest>, StoreError> {
        let mut digests = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            // Temp files and strays don't parse as digests.
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(digest) = name.parse::<Digest>() {
                    digests.push(digest);
                }
            }
        }
        Ok(digests)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        for digest in self.iter().await? {
            self.delete(&digest).await?;
        }
        Ok(())
    }
}
