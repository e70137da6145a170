//! Authentication error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("unknown credential")]
    UnknownCredential,

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("database error: {0}")]
    Db(#[from] blobvault_db::DbError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::MissingCredential => (StatusCode::UNAUTHORIZED, "missing credential"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "token expired"),
            AuthError::UnknownCredential => (StatusCode::UNAUTHORIZED, "unknown credential"),
            AuthError::Jwt(_) => (StatusCode::UNAUTHORIZED, "invalid token"),
            AuthError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
        };

        let body = axum::Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
