//! Blobvault Storage Layer
//!
//! This crate provides the content-addressed blob store abstraction and its
//! filesystem, in-memory and object-store backends, plus the size-tiered
//! composition that routes blobs by content length.

pub mod digest;
pub mod error;
pub mod local;
pub mod memory;
pub mod object;
pub mod spool;
pub mod store;
pub mod tiered;

pub use digest::{digest_bytes, digest_stream, Digest, CHUNK_SIZE};
pub use error::StoreError;
pub use local::LocalFileStore;
pub use memory::InMemoryStore;
pub use object::{ObjectStoreBackend, ObjectStoreConfig};
pub use spool::Spooled;
pub use store::{BlobInfo, BlobStore, ByteStream};
pub use tiered::SizeTieredStore;
