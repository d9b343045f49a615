use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::SessionTicketRegistry,
    },
    models::SessionServiceTicket,
};

pub struct SqliteSessionTicketRegistry {
    pool: SqlitePool,
}

impl SqliteSessionTicketRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionTicketRegistry for SqliteSessionTicketRegistry {
    async fn record(
        &self,
        service_ticket: &str,
        session_key: &str,
    ) -> DbResult<SessionServiceTicket> {
        let mapping = SessionServiceTicket {
            service_ticket: service_ticket.to_string(),
            session_key: session_key.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO session_service_tickets (service_ticket, session_key, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&mapping.service_ticket)
        .bind(&mapping.session_key)
        .bind(mapping.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::Conflict(
                "Service ticket is already linked to a session".into(),
            ),
            _ => DbError::from(e),
        })?;

        Ok(mapping)
    }

    async fn lookup(&self, service_ticket: &str) -> DbResult<Option<String>> {
        let row = sqlx::query(
            "SELECT session_key FROM session_service_tickets WHERE service_ticket = ?",
        )
        .bind(service_ticket)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get("session_key")))
    }

    async fn delete_by_session_key(&self, session_key: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM session_service_tickets WHERE session_key = ?")
            .bind(session_key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
