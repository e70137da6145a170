//! Cache row operations

use chrono::Utc;
use sqlx::{Row, SqliteConnection};

use crate::error::DbError;
use crate::models::{CacheRow, EvictionOrder};
use crate::repository::{format_ts, parse_ts};

fn row_from_row(row: &sqlx::sqlite::SqliteRow) -> CacheRow {
    CacheRow {
        digest: row.get("digest"),
        content_length: row.get("content_length"),
        is_cached: row.get("is_cached"),
        is_stored: row.get("is_stored"),
        accesses: row.get("accesses"),
        last_accessed: parse_ts(row.get("last_accessed")),
    }
}

const ROW_COLUMNS: &str = "digest, content_length, is_cached, is_stored, accesses, last_accessed";

pub async fn get(conn: &mut SqliteConnection, digest: &str) -> Result<Option<CacheRow>, DbError> {
    let row = sqlx::query(&format!(
        "SELECT {ROW_COLUMNS} FROM cache_rows WHERE digest = ?"
    ))
    .bind(digest)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.as_ref().map(row_from_row))
}

/// First sighting of a digest: insert a row with both flags down. A row
/// that already exists is left untouched.
pub async fn insert_if_absent(
    conn: &mut SqliteConnection,
    digest: &str,
    content_length: i64,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO cache_rows (digest, content_length, is_cached, is_stored, accesses, last_accessed)
        VALUES (?, ?, 0, 0, 0, ?)
        "#,
    )
    .bind(digest)
    .bind(content_length)
    .bind(format_ts(Utc::now()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn set_cached(
    conn: &mut SqliteConnection,
    digest: &str,
    is_cached: bool,
) -> Result<(), DbError> {
    sqlx::query("UPDATE cache_rows SET is_cached = ? WHERE digest = ?")
        .bind(is_cached)
        .bind(digest)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn set_stored(
    conn: &mut SqliteConnection,
    digest: &str,
    is_stored: bool,
) -> Result<(), DbError> {
    sqlx::query("UPDATE cache_rows SET is_stored = ? WHERE digest = ?")
        .bind(is_stored)
        .bind(digest)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Update last accessed time and increment access count
pub async fn touch(conn: &mut SqliteConnection, digest: &str) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE cache_rows
        SET accesses = accesses + 1, last_accessed = ?
        WHERE digest = ?
        "#,
    )
    .bind(format_ts(Utc::now()))
    .bind(digest)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, digest: &str) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM cache_rows WHERE digest = ?")
        .bind(digest)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove the row when neither copy exists any more.
pub async fn delete_if_orphan(conn: &mut SqliteConnection, digest: &str) -> Result<bool, DbError> {
    let result = sqlx::query(
        "DELETE FROM cache_rows WHERE digest = ? AND is_cached = 0 AND is_stored = 0",
    )
    .bind(digest)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Bytes currently held in the cache, derived from the rows rather than a
/// running counter.
pub async fn cached_size(conn: &mut SqliteConnection) -> Result<i64, DbError> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(content_length), 0) AS total FROM cache_rows WHERE is_cached = 1",
    )
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get("total"))
}

/// Digests that are cached but have never reached the origin.
pub async fn unpushed(conn: &mut SqliteConnection) -> Result<Vec<String>, DbError> {
    let rows = sqlx::query("SELECT digest FROM cache_rows WHERE is_cached = 1 AND is_stored = 0")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.iter().map(|r| r.get("digest")).collect())
}

/// Every digest the row table knows about.
pub async fn all_digests(conn: &mut SqliteConnection) -> Result<Vec<String>, DbError> {
    let rows = sqlx::query("SELECT digest FROM cache_rows")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.iter().map(|r| r.get("digest")).collect())
}

/// Rows eligible for eviction: cached, already pushed to the origin, and
/// larger than `min_length`, in the order the policy prefers to drop them.
pub async fn eviction_candidates(
    conn: &mut SqliteConnection,
    min_length: i64,
    order: EvictionOrder,
) -> Result<Vec<CacheRow>, DbError> {
    let order_clause = match order {
        EvictionOrder::LastAccessed => "last_accessed ASC",
        EvictionOrder::Accesses => "accesses ASC, last_accessed ASC",
    };
    let rows = sqlx::query(&format!(
        r#"
        SELECT {ROW_COLUMNS}
        FROM cache_rows
        WHERE is_cached = 1 AND is_stored = 1 AND content_length > ?
        ORDER BY {order_clause}
        "#
    ))
    .bind(min_length)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.iter().map(row_from_row).collect())
}
