//! Storage error types

use thiserror::Error;

use crate::digest::Digest;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no blob with digest {0}")]
    NotFound(Digest),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("downloaded blob failed verification: {0}")]
    Integrity(String),

    #[error("blob of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("cache cannot reclaim {needed} bytes")]
    CacheFull { needed: u64 },

    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("remote store error: {0}")]
    Remote(String),

    #[error("database error: {0}")]
    Database(String),
}
