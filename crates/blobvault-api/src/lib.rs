//! Blobvault REST API
//!
//! This crate provides the Axum-based HTTP surface: the blob wire protocol
//! (`/blob`) plus user, health and metrics endpoints.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, MetricsHandle};
