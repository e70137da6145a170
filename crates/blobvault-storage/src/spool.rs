//! Spill-to-disk payload spooling
//!
//! Ingest paths receive a byte stream that can only be read once, but the
//! digest has to be known before any backend is chosen and the same content
//! may be written to more than one place. `Spooled` drains the source into
//! memory (spilling to a temporary file above a threshold), computing the
//! digest and length in the same pass, and can then be re-opened as a
//! stream any number of times.

use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::digest::{digest_bytes, Digest, CHUNK_SIZE};
use crate::error::StoreError;
use crate::store::{BlobInfo, ByteStream};

/// Spill to a temporary file once the payload exceeds 8 MiB.
pub const DEFAULT_SPILL_THRESHOLD: usize = 8 * 1024 * 1024;

enum SpoolInner {
    Memory(Bytes),
    File(NamedTempFile),
}

/// A fully received payload with its verified identity.
pub struct Spooled {
    inner: SpoolInner,
    info: BlobInfo,
}

impl Spooled {
    /// Drain `stream` to completion, computing the digest and length along
    /// the way. Content larger than `spill_threshold` lands in a temporary
    /// file that is removed when the `Spooled` is dropped.
    pub async fn from_stream_with_threshold(
        mut stream: ByteStream,
        spill_threshold: usize,
    ) -> Result<Self, StoreError> {
        let mut hasher = blake3::Hasher::new();
        let mut content_length: u64 = 0;
        let mut buf: Vec<u8> = Vec::new();
        let mut spilled: Option<(NamedTempFile, tokio::fs::File)> = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            content_length += chunk.len() as u64;
            match &mut spilled {
                Some((_, file)) => file.write_all(&chunk).await?,
                None => {
                    buf.extend_from_slice(&chunk);
                    if buf.len() > spill_threshold {
                        let tmp = NamedTempFile::new()?;
                        let mut file = tokio::fs::File::create(tmp.path()).await?;
                        file.write_all(&buf).await?;
                        buf = Vec::new();
                        spilled = Some((tmp, file));
                    }
                }
            }
        }

        let inner = match spilled {
            Some((tmp, mut file)) => {
                file.flush().await?;
                SpoolInner::File(tmp)
            }
            None => SpoolInner::Memory(Bytes::from(buf)),
        };

        Ok(Spooled {
            inner,
            info: BlobInfo {
                digest: Digest::from_hash(hasher.finalize()),
                content_length,
            },
        })
    }

    pub async fn from_stream(stream: ByteStream) -> Result<Self, StoreError> {
        Self::from_stream_with_threshold(stream, DEFAULT_SPILL_THRESHOLD).await
    }

    /// Spool an in-memory payload. Mostly used by tests and the push path.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let info = BlobInfo {
            digest: digest_bytes(&data),
            content_length: data.len() as u64,
        };
        Spooled {
            inner: SpoolInner::Memory(data),
            info,
        }
    }

    pub fn info(&self) -> &BlobInfo {
        &self.info
    }

    pub fn digest(&self) -> &Digest {
        &self.info.digest
    }

    pub fn content_length(&self) -> u64 {
        self.info.content_length
    }

    /// Re-open the payload as a byte stream.
    pub async fn stream(&self) -> Result<ByteStream, StoreError> {
        match &self.inner {
            SpoolInner::Memory(data) => {
                let data = data.clone();
                Ok(Box::pin(stream::once(async move { Ok(data) })))
            }
            SpoolInner::File(tmp) => {
                let file = tokio::fs::File::open(tmp.path()).await?;
                Ok(Box::pin(
                    ReaderStream::with_capacity(file, CHUNK_SIZE).map_err(StoreError::Io),
                ))
            }
        }
    }

    /// Materialize the whole payload in memory.
    pub async fn bytes(&self) -> Result<Bytes, StoreError> {
        match &self.inner {
            SpoolInner::Memory(data) => Ok(data.clone()),
            SpoolInner::File(tmp) => {
                let data = tokio::fs::read(tmp.path()).await?;
                Ok(Bytes::from(data))
            }
        }
    }
}
