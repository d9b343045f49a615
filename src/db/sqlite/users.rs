use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{UserRepo, check_username},
    },
    models::User,
};

pub struct SqliteUserRepo {
    pool: SqlitePool,
}

impl SqliteUserRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn user_from_row(row: &SqliteRow) -> DbResult<User> {
        Ok(User {
            id: Uuid::parse_str(&row.get::<String, _>("id"))
                .map_err(|e| DbError::Internal(format!("invalid user id in database: {e}")))?,
            username: row.get("username"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl UserRepo for SqliteUserRepo {
    async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, created_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::user_from_row).transpose()
    }

    async fn get_or_create(&self, username: &str) -> DbResult<User> {
        check_username(username)?;

        // A concurrent login for the same user may win the insert; either
        // way the row exists afterwards.
        sqlx::query(
            r#"
            INSERT INTO users (id, username, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(username) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(username)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_by_username(username).await?.ok_or_else(|| {
            DbError::Internal(format!("user '{username}' missing after insert"))
        })
    }
}
