//! Blobvault Database Layer
//!
//! This crate provides the relational bookkeeping for blobvault, using
//! SQLite via sqlx: blob claims, cache rows, in-database blob contents,
//! users and API keys. The claim and cache-row operations are exposed as
//! functions over a `SqliteConnection` so callers can compose them inside
//! their own transactions.

pub mod error;
pub mod models;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use models::*;
pub use repository::{cache_rows, claims, contents, users, Database};
pub use store::DatabaseStore;

/// Re-export sqlx types for convenience
pub use sqlx::{SqliteConnection, SqlitePool};
