//! The blob store trait

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::digest::Digest;
use crate::error::StoreError;
use crate::spool::Spooled;

/// Type alias for a boxed stream of bytes
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StoreError>> + Send>>;

/// Identity of a stored blob: its digest and exact length in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub digest: Digest,
    pub content_length: u64,
}

/// Uniform contract implemented by every blob backend.
///
/// Implementations are content-addressed: a blob lives under its digest and
/// writes of an already-present digest are idempotent. Compositions
/// (`SizeTieredStore`, the cache store) implement the same trait over inner
/// stores held as shared references.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Open a blob for reading. The caller drives the stream to completion.
    async fn open(&self, digest: &Digest) -> Result<ByteStream, StoreError>;

    /// Store a spooled blob. The payload's digest and length were computed
    /// while spooling and are trusted; backends do not recompute.
    async fn add(&self, blob: &Spooled) -> Result<BlobInfo, StoreError>;

    /// Check whether a blob is present.
    async fn has(&self, digest: &Digest) -> Result<bool, StoreError>;

    /// Digest and length of a blob, or `None` if absent.
    async fn get_info(&self, digest: &Digest) -> Result<Option<BlobInfo>, StoreError>;

    /// Remove a blob. Silent if absent.
    async fn delete(&self, digest: &Digest) -> Result<(), StoreError>;

    /// Enumerate all stored digests. Backends where enumeration is not a
    /// supported operation return `StoreError::Unsupported`.
    async fn iter(&self) -> Result<Vec<Digest>, StoreError>;

    /// Remove every blob this store owns.
    async fn clear(&self) -> Result<(), StoreError>;
}
