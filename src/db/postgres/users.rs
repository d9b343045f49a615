use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    db::{
        error::DbResult,
        repos::{UserRepo, check_username},
    },
    models::User,
};

pub struct PostgresUserRepo {
    pool: PgPool,
}

impl PostgresUserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn user_from_row(row: &PgRow) -> User {
        User {
            id: row.get("id"),
            username: row.get("username"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl UserRepo for PostgresUserRepo {
    async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::user_from_row))
    }

    async fn get_or_create(&self, username: &str) -> DbResult<User> {
        check_username(username)?;

        // The no-op update makes RETURNING yield the existing row on conflict
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, username)
            VALUES ($1, $2)
            ON CONFLICT (username) DO UPDATE SET username = EXCLUDED.username
            RETURNING id, username, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::user_from_row(&row))
    }
}
