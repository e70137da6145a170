//! Health and status endpoints

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub time: String,
}

async fn status() -> Json<StatusResponse> {
    metrics::counter!("blobvault_health_checks_total").increment(1);

    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        time: chrono::Utc::now().to_rfc3339(),
    })
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(status))
        .route("/status", get(status))
}
