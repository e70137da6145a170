//! Remote backend error types

use thiserror::Error;

use blobvault_storage::StoreError;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("remote operation timed out")]
    Timeout,

    #[error("remote rejected credentials")]
    Unauthorized,

    #[error("remote returned {status}: {message}")]
    Unexpected { status: u16, message: String },
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        // The caller may retry a timed-out control call; everything else is
        // a plain transport failure.
        if e.is_timeout() {
            RemoteError::Timeout
        } else {
            RemoteError::Http(e)
        }
    }
}

impl From<RemoteError> for StoreError {
    fn from(e: RemoteError) -> Self {
        StoreError::Remote(e.to_string())
    }
}
