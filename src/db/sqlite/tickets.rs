use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::TicketStore,
    },
    models::{PgtIou, TicketGrantingTicket},
};

pub struct SqliteTicketStore {
    pool: SqlitePool,
}

impl SqliteTicketStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn tgt_from_row(row: &SqliteRow) -> TicketGrantingTicket {
        TicketGrantingTicket {
            username: row.get("username"),
            tgt: row.get("tgt"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl TicketStore for SqliteTicketStore {
    async fn upsert_tgt(&self, username: &str, tgt: &str) -> DbResult<TicketGrantingTicket> {
        let row = sqlx::query(
            r#"
            INSERT INTO ticket_granting_tickets (username, tgt, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(username) DO UPDATE SET
                tgt = excluded.tgt,
                updated_at = excluded.updated_at
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
            WHERE username = ?
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
            VALUES (?, ?, ?)
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
        // Single statement, so concurrent takes cannot both see the row
        let row = sqlx::query(
            r#"
            DELETE FROM pgt_ious
            WHERE iou = ?
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
        let result = sqlx::query("DELETE FROM pgt_ious WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
