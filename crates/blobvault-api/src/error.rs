//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use blobvault_core::CoreError;
use blobvault_db::DbError;
use blobvault_storage::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("auth error: {0}")]
    Auth(#[from] blobvault_auth::AuthError),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

fn store_status(e: &StoreError) -> (StatusCode, &'static str) {
    match e {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        StoreError::InvalidDigest(_) => (StatusCode::BAD_REQUEST, "DIGEST_INVALID"),
        StoreError::DigestMismatch { .. } => (StatusCode::BAD_REQUEST, "DIGEST_MISMATCH"),
        StoreError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "TOO_LARGE"),
        // Bad bytes from a backend are the server's problem, not the client's.
        StoreError::Integrity(_) => (StatusCode::BAD_GATEWAY, "INTEGRITY"),
        StoreError::CacheFull { .. } => (StatusCode::SERVICE_UNAVAILABLE, "CACHE_FULL"),
        StoreError::Unsupported(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UNSUPPORTED"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    }
}

fn db_status(e: &DbError) -> (StatusCode, &'static str) {
    match e {
        DbError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        DbError::ClaimConflict { .. } => (StatusCode::CONFLICT, "CLAIM_CONFLICT"),
        DbError::Duplicate(_) => (StatusCode::CONFLICT, "DUPLICATE"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Core(e) => match e {
                CoreError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
                CoreError::DigestMismatch { .. } => {
                    (StatusCode::BAD_REQUEST, "DIGEST_MISMATCH", e.to_string())
                }
                CoreError::QuotaExceeded { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, "QUOTA_EXCEEDED", e.to_string())
                }
                CoreError::Db(inner) => {
                    let (status, code) = db_status(inner);
                    (status, code, inner.to_string())
                }
                CoreError::Store(inner) => {
                    let (status, code) = store_status(inner);
                    (status, code, inner.to_string())
                }
            },
            ApiError::Auth(e) => {
                let status = match e {
                    blobvault_auth::AuthError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::UNAUTHORIZED,
                };
                (status, "AUTH_ERROR", e.to_string())
            }
            ApiError::Database(e) => {
                let (status, code) = db_status(e);
                (status, code, e.to_string())
            }
            ApiError::Storage(e) => {
                let (status, code) = store_status(e);
                (status, code, e.to_string())
            }
        };

        let body = axum::Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
