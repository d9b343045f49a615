use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    db::error::DbResult,
    models::{PgtIou, TicketGrantingTicket},
};

/// PGT IOUs that were never correlated are dropped after this many days.
pub const PGT_IOU_EXPIRY_DAYS: i64 = 2;

/// Storage for proxy-granting tickets and the IOUs that lead to them.
///
/// The store is the only place where the proxy callback and the validating
/// request meet, so every implementation must make `take_pgt_iou` atomic:
/// two concurrent takes of the same IOU yield at most one record.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Store the ticket for `username`, replacing any previous one.
    async fn upsert_tgt(&self, username: &str, tgt: &str) -> DbResult<TicketGrantingTicket>;

    /// Look up the stored ticket for `username`.
    async fn get_tgt(&self, username: &str) -> DbResult<Option<TicketGrantingTicket>>;

    /// Insert a pending IOU record.
    ///
    /// # Errors
    /// Returns `DbError::Conflict` if the IOU is already stored.
    async fn insert_pgt_iou(&self, record: &PgtIou) -> DbResult<()>;

    /// Remove and return the record for `iou`, if present.
    async fn take_pgt_iou(&self, iou: &str) -> DbResult<Option<PgtIou>>;

    /// Delete IOU records created strictly before `cutoff`.
    /// Returns the number of rows removed.
    async fn purge_pgt_ious_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64>;

    /// Record a PGT delivered to the proxy callback, stamped with the
    /// current time.
    async fn put_pgt_iou(&self, iou: &str, tgt: &str) -> DbResult<PgtIou> {
        let record = PgtIou::new(iou, tgt);
        self.insert_pgt_iou(&record).await?;
        Ok(record)
    }

    /// Delete IOU records older than [`PGT_IOU_EXPIRY_DAYS`] relative to
    /// `now`. A record exactly at the boundary is kept.
    async fn purge_expired_pgt_ious(&self, now: DateTime<Utc>) -> DbResult<u64> {
        self.purge_pgt_ious_before(now - TimeDelta::days(PGT_IOU_EXPIRY_DAYS))
            .await
    }
}
