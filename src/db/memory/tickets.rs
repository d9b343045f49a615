use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::TicketStore,
    },
    models::{PgtIou, TicketGrantingTicket},
};

#[derive(Default)]
pub struct MemoryTicketStore {
    tgts: RwLock<HashMap<String, TicketGrantingTicket>>,
    ious: RwLock<HashMap<String, PgtIou>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn upsert_tgt(&self, username: &str, tgt: &str) -> DbResult<TicketGrantingTicket> {
        let record = TicketGrantingTicket {
            username: username.to_string(),
            tgt: tgt.to_string(),
            updated_at: Utc::now(),
        };
        self.tgts
            .write()
            .await
            .insert(username.to_string(), record.clone());
        Ok(record)
    }

    async fn get_tgt(&self, username: &str) -> DbResult<Option<TicketGrantingTicket>> {
        Ok(self.tgts.read().await.get(username).cloned())
    }

    async fn insert_pgt_iou(&self, record: &PgtIou) -> DbResult<()> {
        let mut ious = self.ious.write().await;
        if ious.contains_key(&record.iou) {
            return Err(DbError::Conflict(format!(
                "PGT IOU '{}' already exists",
                record.iou
            )));
        }
        ious.insert(record.iou.clone(), record.clone());
        Ok(())
    }

    async fn take_pgt_iou(&self, iou: &str) -> DbResult<Option<PgtIou>> {
        Ok(self.ious.write().await.remove(iou))
    }

    async fn purge_pgt_ious_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let mut ious = self.ious.write().await;
        let before = ious.len();
        ious.retain(|_, record| record.created_at >= cutoff);
        Ok((before - ious.len()) as u64)
    }
}
