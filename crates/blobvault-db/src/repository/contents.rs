//! In-database blob content operations
//!
//! Small blobs live directly in a BLOB column, which avoids a filesystem
//! round trip for the sizes the size-tiered store routes here.

use chrono::Utc;
use sqlx::{Row, SqliteConnection};

use crate::error::DbError;
use crate::repository::format_ts;

/// Idempotent insert: an existing row for the digest is left alone.
pub async fn insert_if_absent(
    conn: &mut SqliteConnection,
    digest: &str,
    content: &[u8],
    content_length: i64,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO blob_contents (digest, content, content_length, accesses, last_accessed)
        VALUES (?, ?, ?, 0, ?)
        "#,
    )
    .bind(digest)
    .bind(content)
    .bind(content_length)
    .bind(format_ts(Utc::now()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fetch the content, bumping the access counters.
pub async fn open(conn: &mut SqliteConnection, digest: &str) -> Result<Option<Vec<u8>>, DbError> {
    sqlx::query(
        r#"
        UPDATE blob_contents
        SET accesses = accesses + 1, last_accessed = ?
        WHERE digest = ?
        "#,
    )
    .bind(format_ts(Utc::now()))
    .bind(digest)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query("SELECT content FROM blob_contents WHERE digest = ?")
        .bind(digest)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| r.get("content")))
}

pub async fn has(conn: &mut SqliteConnection, digest: &str) -> Result<bool, DbError> {
    let row = sqlx::query("SELECT 1 FROM blob_contents WHERE digest = ?")
        .bind(digest)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

pub async fn content_length(
    conn: &mut SqliteConnection,
    digest: &str,
) -> Result<Option<i64>, DbError> {
    let row = sqlx::query("SELECT content_length FROM blob_contents WHERE digest = ?")
        .bind(digest)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| r.get("content_length")))
}

pub async fn delete(conn: &mut SqliteConnection, digest: &str) -> Result<(), DbError> {
    sqlx::query("DELETE FROM blob_contents WHERE digest = ?")
        .bind(digest)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn iter(conn: &mut SqliteConnection) -> Result<Vec<String>, DbError> {
    let rows = sqlx::query("SELECT digest FROM blob_contents")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.iter().map(|r| r.get("digest")).collect())
}

pub async fn clear(conn: &mut SqliteConnection) -> Result<(), DbError> {
    sqlx::query("DELETE FROM blob_contents")
        .execute(&mut *conn)
        .await?;
    Ok(())
}
