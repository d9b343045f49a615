use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::SessionTicketRegistry,
    },
    models::SessionServiceTicket,
};

pub struct PostgresSessionTicketRegistry {
    pool: PgPool,
}

impl PostgresSessionTicketRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionTicketRegistry for PostgresSessionTicketRegistry {
    async fn record(
        &self,
        service_ticket: &str,
        session_key: &str,
    ) -> DbResult<SessionServiceTicket> {
        let row = sqlx::query(
            r#"
            INSERT INTO session_service_tickets (service_ticket, session_key, created_at)
            VALUES ($1, $2, $3)
            RETURNING service_ticket, session_key, created_at
            "#,
        )
        .bind(service_ticket)
        .bind(session_key)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::Conflict(
                "Service ticket is already linked to a session".into(),
            ),
            _ => DbError::from(e),
        })?;

        Ok(SessionServiceTicket {
            service_ticket: row.get("service_ticket"),
            session_key: row.get("session_key"),
            created_at: row.get("created_at"),
        })
    }

    async fn lookup(&self, service_ticket: &str) -> DbResult<Option<String>> {
        let row = sqlx::query(
            "SELECT session_key FROM session_service_tickets WHERE service_ticket = $1",
        )
        .bind(service_ticket)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get("session_key")))
    }

    async fn delete_by_session_key(&self, session_key: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM session_service_tickets WHERE session_key = $1")
            .bind(session_key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
