//! Authentication middleware for Axum

use axum::{
    extract::{FromRequestParts, Request, State},
    http::header::AUTHORIZATION,
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use blobvault_db::User;

use crate::error::AuthError;
use crate::resolver::CredentialResolver;

/// The authenticated user for the current request.
///
/// Inserted into request extensions by [`auth_middleware`]; handlers that
/// extract it directly get a 401 when no valid credential was presented.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::MissingCredential)
    }
}

/// Authentication middleware
///
/// Extracts the Authorization header (with or without a `Bearer ` prefix),
/// resolves it, and attaches the user to the request. Requests without a
/// header pass through unauthenticated; a presented-but-invalid credential
/// is rejected here.
pub async fn auth_middleware(
    State(resolver): State<Arc<dyn CredentialResolver>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if let Some(header) = auth_header {
        let presented = header.strip_prefix("Bearer ").unwrap_or(header);
        let user = resolver.resolve(presented).await?;
        debug!("Authenticated user: {} ({})", user.name, user.id);
        request.extensions_mut().insert(CurrentUser(user));
    }

    Ok(next.run(request).await)
}
