//! Claim table operations
//!
//! A claim is visible to a viewer iff the viewer owns it or it is public.
//! All predicates are explicit SQL conjunctions over the two columns.

use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{BlobClaim, ClaimUpsert, NewClaim};
use crate::repository::{format_ts, parse_ts};

fn claim_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<BlobClaim, DbError> {
    let user_id: String = row.get("user_id");
    Ok(BlobClaim {
        digest: row.get("digest"),
        user_id: Uuid::parse_str(&user_id)
            .map_err(|e| DbError::Corrupt(format!("bad user id {}: {}", user_id, e)))?,
        content_length: row.get("content_length"),
        is_public: row.get("is_public"),
        accesses: row.get("accesses"),
        last_accessed: parse_ts(row.get("last_accessed")),
        created: parse_ts(row.get("created")),
    })
}

const CLAIM_COLUMNS: &str =
    "digest, user_id, content_length, is_public, accesses, last_accessed, created";

/// Select the claim that makes `digest` visible to `viewer`, preferring the
/// viewer's own claim over somebody else's public one.
pub async fn select_visible(
    conn: &mut SqliteConnection,
    digest: &str,
    viewer: Uuid,
) -> Result<Option<BlobClaim>, DbError> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {CLAIM_COLUMNS}
        FROM claims
        WHERE digest = ?1 AND (user_id = ?2 OR is_public = 1)
        ORDER BY CASE WHEN user_id = ?2 THEN 0 ELSE 1 END
        LIMIT 1
        "#
    ))
    .bind(digest)
    .bind(viewer.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(claim_from_row).transpose()
}

/// Whether `user` holds a claim on `digest` (ignores visibility).
pub async fn is_claimed_by(
    conn: &mut SqliteConnection,
    digest: &str,
    user: Uuid,
) -> Result<bool, DbError> {
    let row = sqlx::query("SELECT 1 FROM claims WHERE digest = ? AND user_id = ?")
        .bind(digest)
        .bind(user.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

/// Upsert on `(digest, user_id)`.
///
/// An existing claim with a different `content_length` is a `ClaimConflict`:
/// the length was fixed when the blob was first stored and must not drift.
/// The public flag merges as OR over the existing and requested values.
pub async fn upsert(conn: &mut SqliteConnection, claim: &NewClaim) -> Result<ClaimUpsert, DbError> {
    let existing = sqlx::query(
        "SELECT content_length, is_public FROM claims WHERE digest = ? AND user_id = ?",
    )
    .bind(&claim.digest)
    .bind(claim.user_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        None => {
            let now = format_ts(Utc::now());
            sqlx::query(
                r#"
                INSERT INTO claims (digest, user_id, content_length, is_public, accesses, last_accessed, created)
                VALUES (?, ?, ?, ?, 0, ?, ?)
                "#,
            )
            .bind(&claim.digest)
            .bind(claim.user_id.to_string())
            .bind(claim.content_length)
            .bind(claim.is_public)
            .bind(&now)
            .bind(&now)
            .execute(&mut *conn)
            .await?;
            Ok(ClaimUpsert {
                created: true,
                is_public: claim.is_public,
            })
        }
        Some(row) => {
            let existing_length: i64 = row.get("content_length");
            let existing_public: bool = row.get("is_public");
            if existing_length != claim.content_length {
                return Err(DbError::ClaimConflict {
                    digest: claim.digest.clone(),
                    existing: existing_length,
                    new: claim.content_length,
                });
            }
            if claim.is_public && !existing_public {
                sqlx::query("UPDATE claims SET is_public = 1 WHERE digest = ? AND user_id = ?")
                    .bind(&claim.digest)
                    .bind(claim.user_id.to_string())
                    .execute(&mut *conn)
                    .await?;
            }
            Ok(ClaimUpsert {
                created: false,
                is_public: existing_public || claim.is_public,
            })
        }
    }
}

/// Bump access counters on every claim that makes `digest` visible to
/// `viewer`.
pub async fn touch(
    conn: &mut SqliteConnection,
    digest: &str,
    viewer: Uuid,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE claims
        SET accesses = accesses + 1, last_accessed = ?
        WHERE digest = ? AND (user_id = ? OR is_public = 1)
        "#,
    )
    .bind(format_ts(Utc::now()))
    .bind(digest)
    .bind(viewer.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Total bytes claimed by `user`.
pub async fn usage(conn: &mut SqliteConnection, user: Uuid) -> Result<i64, DbError> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(content_length), 0) AS total FROM claims WHERE user_id = ?",
    )
    .bind(user.to_string())
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get("total"))
}

/// All claims owned by `user` (public claims of other users are not theirs
/// to list).
pub async fn list_for_user(
    conn: &mut SqliteConnection,
    user: Uuid,
) -> Result<Vec<BlobClaim>, DbError> {
    let rows = sqlx::query(&format!(
        "SELECT {CLAIM_COLUMNS} FROM claims WHERE user_id = ? ORDER BY created"
    ))
    .bind(user.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(claim_from_row).collect()
}

/// Remove `user`'s claim on `digest`. Returns whether a row was deleted.
pub async fn delete(
    conn: &mut SqliteConnection,
    digest: &str,
    user: Uuid,
) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM claims WHERE digest = ? AND user_id = ?")
        .bind(digest)
        .bind(user.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Whether any claim on `digest` remains, from any user.
pub async fn any_for_digest(conn: &mut SqliteConnection, digest: &str) -> Result<bool, DbError> {
    let row = sqlx::query("SELECT 1 FROM claims WHERE digest = ? LIMIT 1")
        .bind(digest)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}
