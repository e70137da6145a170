//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("database error: {0}")]
    Db(#[from] blobvault_db::DbError),

    #[error("storage error: {0}")]
    Store(#[from] blobvault_storage::StoreError),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("quota exceeded: {usage} of {quota} bytes used, {requested} more requested")]
    QuotaExceeded {
        usage: u64,
        quota: u64,
        requested: u64,
    },

    #[error("not found: {0}")]
    NotFound(String),
}
