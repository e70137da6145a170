//! Database error types

use thiserror::Error;

use blobvault_storage::StoreError;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate entry: {0}")]
    Duplicate(String),

    #[error("claim length conflict for {digest}: existing {existing}, new {new}")]
    ClaimConflict {
        digest: String,
        existing: i64,
        new: i64,
    },

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        StoreError::Database(e.to_string())
    }
}
