//! Blobvault Authentication
//!
//! This crate resolves presented credentials (JWTs and API keys) to users
//! and provides the axum middleware that attaches the resolved user to each
//! request.

pub mod error;
pub mod jwt;
pub mod middleware;
pub mod resolver;

pub use error::AuthError;
pub use jwt::{Claims, JwtManager};
pub use middleware::{auth_middleware, CurrentUser};
pub use resolver::{CredentialResolver, DbCredentials};
