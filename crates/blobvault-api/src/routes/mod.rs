//! API routes

mod blob;
mod health;
mod metrics;
mod user;

use axum::{middleware, Router};
use std::sync::Arc;

use blobvault_auth::auth_middleware;

use crate::state::{AppState, MetricsHandle};

/// Create the main router
pub fn create_router(state: AppState, metrics_handle: Option<Arc<MetricsHandle>>) -> Router {
    // Blob and user endpoints require a resolved credential.
    let authenticated = Router::new()
        .merge(blob::routes())
        .merge(user::routes())
        .layer(middleware::from_fn_with_state(
            state.resolver.clone(),
            auth_middleware,
        ));

    let mut router = Router::new()
        .merge(health::routes())
        .merge(authenticated)
        .with_state(state);

    if let Some(handle) = metrics_handle {
        router = router.merge(metrics::routes(handle));
    }

    router
}
