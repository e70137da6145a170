//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's claim on a blob. The physical blob is shared; the claim records
/// who may see it and how it has been used. Primary key `(digest, user_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobClaim {
    pub digest: String,
    pub user_id: Uuid,
    pub content_length: i64,
    pub is_public: bool,
    pub accesses: i64,
    pub last_accessed: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

/// New claim (for upsert)
#[derive(Debug, Clone)]
pub struct NewClaim {
    pub digest: String,
    pub user_id: Uuid,
    pub content_length: i64,
    pub is_public: bool,
}

/// Outcome of a claim upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimUpsert {
    /// Whether a new row was inserted.
    pub created: bool,
    /// The claim's public flag after merging (existing OR requested).
    pub is_public: bool,
}

/// Cache bookkeeping for one digest. `is_cached` tracks presence in the
/// near store, `is_stored` presence in the origin; a row where both are
/// false has no reason to exist and is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRow {
    pub digest: String,
    pub content_length: i64,
    pub is_cached: bool,
    pub is_stored: bool,
    pub accesses: i64,
    pub last_accessed: DateTime<Utc>,
}

/// Ordering used when selecting eviction candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionOrder {
    /// Oldest `last_accessed` first.
    LastAccessed,
    /// Fewest `accesses` first, ties broken by `last_accessed`.
    Accesses,
}

/// User model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Maximum total claimed bytes; `None` means unlimited.
    pub quota: Option<i64>,
    pub created: DateTime<Utc>,
}

/// New user (for insertion)
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub quota: Option<i64>,
}

/// API key model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub user_id: Uuid,
    pub label: Option<String>,
    pub created: DateTime<Utc>,
}
