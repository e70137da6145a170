//! Credential resolution
//!
//! The core consumes one interface: a presented credential resolves to a
//! user or it doesn't. What the credential *is* — a session JWT, an opaque
//! API key — is this crate's business.

use async_trait::async_trait;
use tracing::debug;

use blobvault_db::{Database, User};

use crate::error::AuthError;
use crate::jwt::JwtManager;

/// Resolves an opaque presented credential to a user identity.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, presented: &str) -> Result<User, AuthError>;
}

/// Database-backed resolver: session JWTs are validated and their subject
/// looked up; anything else is treated as an API key.
pub struct DbCredentials {
    db: Database,
    jwt: JwtManager,
}

impl DbCredentials {
    pub fn new(db: Database, jwt: JwtManager) -> Self {
        Self { db, jwt }
    }
}

#[async_trait]
impl CredentialResolver for DbCredentials {
    async fn resolve(&self, presented: &str) -> Result<User, AuthError> {
        // JWTs are three dot-separated segments; API keys are plain hex.
        if presented.matches('.').count() == 2 {
            let claims = self.jwt.validate_token(presented)?;
            debug!("Resolved JWT for user {}", claims.sub);
            return self
                .db
                .get_user(claims.sub)
                .await?
                .ok_or(AuthError::UnknownCredential);
        }

        self.db
            .user_by_api_key(presented)
            .await?
            .ok_or(AuthError::UnknownCredential)
    }
}
