//! User endpoints

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

use blobvault_auth::CurrentUser;

use crate::error::ApiError;
use crate::state::AppState;

/// Create user routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/user", get(get_user))
}

/// GET /user - the caller's identity, usage and quota
async fn get_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let usage = state.service.usage(user.id).await?;
    Ok(Json(json!({
        "id": user.id,
        "name": user.name,
        "usage": usage,
        "quota": user.quota,
    })))
}
