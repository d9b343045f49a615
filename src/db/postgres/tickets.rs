use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::TicketStore,
    },
    models::{PgtIou, TicketGrantingTicket},
};

pub struct PostgresTicketStore {
    pool: PgPool,
}

impl PostgresTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn tgt_from_row(row: &PgRow) -> TicketGrantingTicket {
        TicketGrantingTicket {
            username: row.get("username"),
            tgt: row.get("tgt"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl TicketStore for PostgresTicketStore {
    async fn upsert_tgt(&self, username: &str, tgt: &str) -> DbResult<TicketGrantingTicket> {
        let row = sqlx::query(
            r#"
            INSERT INTO ticket_granting_tickets (username, tgt, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (username) DO UPDATE SET
                tgt = EXCLUDED.tgt,
                updated_at = EXCLUDED.updated_at
            RETURNING username, tgt, updated_at
            "#,
        )
        .bind(username)
        .bind(tgt)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::tgt_from_row(&row))
    }

    async fn get_tgt(&self, username: &str) -> DbResult<Option<TicketGrantingTicket>> {
        let row = sqlx::query(
            r#"
            SELECT username, tgt, updated_at
            FROM ticket_granting_tickets
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::tgt_from_row))
    }

    async fn insert_pgt_iou(&self, record: &PgtIou) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pgt_ious (iou, tgt, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&record.iou)
        .bind(&record.tgt)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!("PGT IOU '{}' already exists", record.iou))
            }
            _ => DbError::from(e),
        })?;

        Ok(())
    }

    async fn take_pgt_iou(&self, iou: &str) -> DbResult<Option<PgtIou>> {
        let row = sqlx::query(
            r#"
            DELETE FROM pgt_ious
            WHERE iou = $1
            RETURNING iou, tgt, created_at
            "#,
        )
        .bind(iou)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| PgtIou {
            iou: row.get("iou"),
            tgt: row.get("tgt"),
            created_at: row.get("created_at"),
        }))
    }

    async fn purge_pgt_ious_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM pgt_ious WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
