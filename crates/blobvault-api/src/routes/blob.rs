//! Blob wire protocol routes

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use blobvault_auth::CurrentUser;
use blobvault_db::BlobClaim;
use blobvault_storage::{ByteStream, Digest, StoreError};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for blob upload
#[derive(Deserialize)]
pub struct PutQuery {
    #[serde(default)]
    is_public: bool,
    label: Option<String>,
}

/// Create blob routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/blob", get(list_blobs))
        .route(
            "/blob/{digest}",
            get(get_blob)
                .head(head_blob)
                .put(put_blob)
                .delete(delete_blob),
        )
        .route("/blob/{digest}/info", get(blob_info))
}

fn parse_digest(raw: &str) -> Result<Digest, ApiError> {
    raw.parse()
        .map_err(|e: StoreError| ApiError::BadRequest(e.to_string()))
}

fn claim_headers(response: &mut Response, claim: &BlobClaim) {
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(claim.content_length as u64),
    );
}

/// PUT /blob/{digest} - upload a blob under the caller's claim
async fn put_blob(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(digest): Path<String>,
    Query(query): Query<PutQuery>,
    body: Body,
) -> Result<Response, ApiError> {
    let digest = parse_digest(&digest)?;
    if let Some(label) = &query.label {
        debug!("PUT blob {} ({})", digest, label);
    } else {
        debug!("PUT blob {}", digest);
    }

    let stream: ByteStream = Box::pin(
        body.into_data_stream()
            .map_err(|e| StoreError::Io(std::io::Error::other(e))),
    );
    let outcome = state
        .service
        .put(&user, &digest, stream, query.is_public)
        .await?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(json!({
            "digest": outcome.info.digest,
            "content_length": outcome.info.content_length,
            "is_public": outcome.is_public,
            "created": outcome.created,
        })),
    )
        .into_response())
}

/// GET /blob/{digest} - stream a blob
async fn get_blob(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(digest): Path<String>,
) -> Result<Response, ApiError> {
    let digest = parse_digest(&digest)?;
    debug!("GET blob {}", digest);

    let (claim, stream) = state.service.get(&user, &digest).await?;

    let body = Body::from_stream(stream);
    let mut response = (StatusCode::OK, body).into_response();
    claim_headers(&mut response, &claim);
    Ok(response)
}

/// HEAD /blob/{digest} - claim headers only
async fn head_blob(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(digest): Path<String>,
) -> Result<Response, ApiError> {
    let digest = parse_digest(&digest)?;
    let claim = state.service.head(&user, &digest).await?;

    let mut response = StatusCode::OK.into_response();
    claim_headers(&mut response, &claim);
    Ok(response)
}

/// GET /blob/{digest}/info - claim metadata as JSON
async fn blob_info(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(digest): Path<String>,
) -> Result<Response, ApiError> {
    let digest = parse_digest(&digest)?;
    let claim = state.service.head(&user, &digest).await?;

    Ok(Json(json!({
        "digest": claim.digest,
        "content_length": claim.content_length,
        "is_public": claim.is_public,
    }))
    .into_response())
}

/// DELETE /blob/{digest} - drop the caller's claim
async fn delete_blob(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(digest): Path<String>,
) -> Result<Response, ApiError> {
    let digest = parse_digest(&digest)?;
    debug!("DELETE blob {}", digest);

    state.service.delete(&user, &digest).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// GET /blob - the caller's claims
async fn list_blobs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ApiError> {
    let blobs = state.service.list(&user).await?;
    Ok(Json(json!({ "blobs": blobs })).into_response())
}
