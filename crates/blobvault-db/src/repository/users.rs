//! User and API key operations

use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{ApiKey, NewUser, User};
use crate::repository::{format_ts, parse_ts, Database};

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<User, DbError> {
    let id: String = row.get("id");
    Ok(User {
        id: Uuid::parse_str(&id).map_err(|e| DbError::Corrupt(format!("bad user id: {}", e)))?,
        name: row.get("name"),
        quota: row.get("quota"),
        created: parse_ts(row.get("created")),
    })
}

pub async fn insert(conn: &mut SqliteConnection, user: NewUser) -> Result<User, DbError> {
    let existing = sqlx::query("SELECT 1 FROM users WHERE name = ?")
        .bind(&user.name)
        .fetch_optional(&mut *conn)
        .await?;
    if existing.is_some() {
        return Err(DbError::Duplicate(format!(
            "user '{}' already exists",
            user.name
        )));
    }

    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query("INSERT INTO users (id, name, quota, created) VALUES (?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(&user.name)
        .bind(user.quota)
        .bind(format_ts(now))
        .execute(&mut *conn)
        .await?;

    Ok(User {
        id,
        name: user.name,
        quota: user.quota,
        created: now,
    })
}

pub async fn get(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<User>, DbError> {
    let row = sqlx::query("SELECT id, name, quota, created FROM users WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn by_api_key(conn: &mut SqliteConnection, key: &str) -> Result<Option<User>, DbError> {
    let row = sqlx::query(
        r#"
        SELECT u.id, u.name, u.quota, u.created
        FROM users u
        JOIN api_keys k ON k.user_id = u.id
        WHERE k.key = ?
        "#,
    )
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(user_from_row).transpose()
}

/// Mint a new opaque API key for `user_id`.
pub async fn insert_api_key(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    label: Option<String>,
) -> Result<ApiKey, DbError> {
    let key = format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    );
    let now = Utc::now();
    sqlx::query("INSERT INTO api_keys (key, user_id, label, created) VALUES (?, ?, ?, ?)")
        .bind(&key)
        .bind(user_id.to_string())
        .bind(&label)
        .bind(format_ts(now))
        .execute(&mut *conn)
        .await?;

    Ok(ApiKey {
        key,
        user_id,
        label,
        created: now,
    })
}

pub async fn has_users(conn: &mut SqliteConnection) -> Result<bool, DbError> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM users")
        .fetch_one(&mut *conn)
        .await?;
    let count: i64 = row.get("count");
    Ok(count > 0)
}

impl Database {
    /// Insert a new user
    pub async fn insert_user(&self, user: NewUser) -> Result<User, DbError> {
        let mut conn = self.pool().acquire().await?;
        insert(&mut conn, user).await
    }

    /// Get a user by ID
    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>, DbError> {
        let mut conn = self.pool().acquire().await?;
        get(&mut conn, id).await
    }

    /// Resolve an API key to its user
    pub async fn user_by_api_key(&self, key: &str) -> Result<Option<User>, DbError> {
        let mut conn = self.pool().acquire().await?;
        by_api_key(&mut conn, key).await
    }

    /// Mint an API key
    pub async fn create_api_key(
        &self,
        user_id: Uuid,
        label: Option<String>,
    ) -> Result<ApiKey, DbError> {
        let mut conn = self.pool().acquire().await?;
        insert_api_key(&mut conn, user_id, label).await
    }

    /// Check if any users exist
    pub async fn has_users(&self) -> Result<bool, DbError> {
        let mut conn = self.pool().acquire().await?;
        has_users(&mut conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn user_and_api_key_round_trip() {
        let db = Database::new_in_memory().await.unwrap();

        let user = db
            .insert_user(NewUser {
                name: "alice".to_string(),
                quota: Some(1024),
            })
            .await
            .unwrap();
        assert_eq!(db.get_user(user.id).await.unwrap().unwrap().name, "alice");

        let key = db.create_api_key(user.id, Some("cli".into())).await.unwrap();
        let resolved = db.user_by_api_key(&key.key).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        assert!(db.user_by_api_key("not-a-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_user_name_is_rejected() {
        let db = Database::new_in_memory().await.unwrap();
        let user = NewUser {
            name: "bob".to_string(),
            quota: None,
        };
        db.insert_user(user.clone()).await.unwrap();
        assert!(matches!(
            db.insert_user(user).await,
            Err(DbError::Duplicate(_))
        ));
    }
}
