//! Database connection, migrations and row operations
//!
//! Claim, cache-row and blob-content operations are free functions over a
//! `SqliteConnection`, so the core can run them inside one transaction (the
//! PUT and DELETE shapes require it). `Database` carries the pool and wraps
//! the common single-statement paths.

pub mod cache_rows;
pub mod claims;
pub mod contents;
pub mod users;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::error::DbError;

/// Database connection and operations
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect and run migrations.
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        info!("Connecting to database: {}", database_url);

        let pool = SqlitePool::connect(database_url).await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// An in-memory database on a single pooled connection. Used by tests
    /// and by deployments that want purely ephemeral bookkeeping.
    pub async fn new_in_memory() -> Result<Self, DbError> {
        // One connection only: every new connection to :memory: would get
        // its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Get the underlying pool for advanced usage
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction. Claim-table operations inside one transaction
    /// are linearizable; SQLite gives serializable isolation across them.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, DbError> {
        Ok(self.pool.begin().await?)
    }

    /// Check out a connection for non-transactional row operations.
    pub async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Sqlite>, DbError> {
        Ok(self.pool.acquire().await?)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), DbError> {
        info!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS claims (
                digest TEXT NOT NULL,
                user_id TEXT NOT NULL,
                content_length INTEGER NOT NULL,
                is_public INTEGER NOT NULL DEFAULT 0,
                accesses INTEGER NOT NULL DEFAULT 0,
                last_accessed TEXT NOT NULL,
                created TEXT NOT NULL,
                PRIMARY KEY (digest, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_claims_user ON claims(user_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_rows (
                digest TEXT PRIMARY KEY,
                content_length INTEGER NOT NULL,
                is_cached INTEGER NOT NULL DEFAULT 0,
                is_stored INTEGER NOT NULL DEFAULT 0,
                accesses INTEGER NOT NULL DEFAULT 0,
                last_accessed TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_cache_rows_last_accessed ON cache_rows(last_accessed)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blob_contents (
                digest TEXT PRIMARY KEY,
                content BLOB NOT NULL,
                content_length INTEGER NOT NULL,
                accesses INTEGER NOT NULL DEFAULT 0,
                last_accessed TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                quota INTEGER,
                created TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_keys (
                key TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                label TEXT,
                created TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations completed");
        Ok(())
    }
}

/// RFC 3339 text is the on-disk timestamp representation.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvictionOrder, NewClaim};
    use uuid::Uuid;

    const D1: &str = "1111111111111111111111111111111111111111111111111111111111111111";
    const D2: &str = "2222222222222222222222222222222222222222222222222222222222222222";

    #[tokio::test]
    async fn claim_upsert_merge_and_conflict() {
        let db = Database::new_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let user = Uuid::new_v4();

        let outcome = claims::upsert(
            &mut conn,
            &NewClaim {
                digest: D1.into(),
                user_id: user,
                content_length: 10,
                is_public: false,
            },
        )
        .await
        .unwrap();
        assert!(outcome.created);
        assert!(!outcome.is_public);

        // Re-upsert with is_public merges as OR and does not re-create.
        let outcome = claims::upsert(
            &mut conn,
            &NewClaim {
                digest: D1.into(),
                user_id: user,
                content_length: 10,
                is_public: true,
            },
        )
        .await
        .unwrap();
        assert!(!outcome.created);
        assert!(outcome.is_public);

        // A third upsert without the flag keeps it public.
        let outcome = claims::upsert(
            &mut conn,
            &NewClaim {
                digest: D1.into(),
                user_id: user,
                content_length: 10,
                is_public: false,
            },
        )
        .await
        .unwrap();
        assert!(outcome.is_public);

        // Length drift is a conflict.
        let err = claims::upsert(
            &mut conn,
            &NewClaim {
                digest: D1.into(),
                user_id: user,
                content_length: 11,
                is_public: false,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::ClaimConflict { existing: 10, new: 11, .. }));
    }

    #[tokio::test]
    async fn claim_visibility_and_usage() {
        let db = Database::new_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        for (digest, len, public) in [(D1, 100, false), (D2, 50, true)] {
            claims::upsert(
                &mut conn,
                &NewClaim {
                    digest: digest.into(),
                    user_id: owner,
                    content_length: len,
                    is_public: public,
                },
            )
            .await
            .unwrap();
        }

        // The owner sees both; a stranger only the public one.
        assert!(claims::select_visible(&mut conn, D1, owner).await.unwrap().is_some());
        assert!(claims::select_visible(&mut conn, D1, other).await.unwrap().is_none());
        assert!(claims::select_visible(&mut conn, D2, other).await.unwrap().is_some());

        // Usage counts owned claims only.
        assert_eq!(claims::usage(&mut conn, owner).await.unwrap(), 150);
        assert_eq!(claims::usage(&mut conn, other).await.unwrap(), 0);
        assert_eq!(claims::list_for_user(&mut conn, other).await.unwrap().len(), 0);

        // Touch by a viewer bumps the accessible claim.
        claims::touch(&mut conn, D2, other).await.unwrap();
        let claim = claims::select_visible(&mut conn, D2, other).await.unwrap().unwrap();
        assert_eq!(claim.accesses, 1);
    }

    #[tokio::test]
    async fn claim_delete_and_refcount() {
        let db = Database::new_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        for user in [a, b] {
            claims::upsert(
                &mut conn,
                &NewClaim {
                    digest: D1.into(),
                    user_id: user,
                    content_length: 5,
                    is_public: false,
                },
            )
            .await
            .unwrap();
        }

        assert!(claims::delete(&mut conn, D1, a).await.unwrap());
        assert!(claims::any_for_digest(&mut conn, D1).await.unwrap());
        // Deleting again is a no-op.
        assert!(!claims::delete(&mut conn, D1, a).await.unwrap());

        assert!(claims::delete(&mut conn, D1, b).await.unwrap());
        assert!(!claims::any_for_digest(&mut conn, D1).await.unwrap());
    }

    #[tokio::test]
    async fn cache_row_lifecycle() {
        let db = Database::new_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        cache_rows::insert_if_absent(&mut conn, D1, 10).await.unwrap();
        // Second insert leaves the row untouched.
        cache_rows::insert_if_absent(&mut conn, D1, 10).await.unwrap();

        let row = cache_rows::get(&mut conn, D1).await.unwrap().unwrap();
        assert!(!row.is_cached && !row.is_stored);

        cache_rows::set_cached(&mut conn, D1, true).await.unwrap();
        assert_eq!(cache_rows::cached_size(&mut conn).await.unwrap(), 10);
        assert_eq!(cache_rows::unpushed(&mut conn).await.unwrap(), vec![D1.to_string()]);

        cache_rows::set_stored(&mut conn, D1, true).await.unwrap();
        assert!(cache_rows::unpushed(&mut conn).await.unwrap().is_empty());

        // Only cached+stored rows are eviction candidates.
        cache_rows::insert_if_absent(&mut conn, D2, 20).await.unwrap();
        cache_rows::set_cached(&mut conn, D2, true).await.unwrap();
        let candidates = cache_rows::eviction_candidates(&mut conn, 0, EvictionOrder::LastAccessed)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].digest, D1);

        // A row with both flags down is an orphan.
        cache_rows::set_cached(&mut conn, D2, false).await.unwrap();
        assert!(cache_rows::delete_if_orphan(&mut conn, D2).await.unwrap());
        assert!(!cache_rows::delete_if_orphan(&mut conn, D1).await.unwrap());
        assert!(cache_rows::get(&mut conn, D1).await.unwrap().is_some());
    }
}
