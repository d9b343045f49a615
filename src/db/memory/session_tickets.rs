use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::SessionTicketRegistry,
    },
    models::SessionServiceTicket,
};

#[derive(Default)]
pub struct MemorySessionTicketRegistry {
    by_ticket: RwLock<HashMap<String, SessionServiceTicket>>,
}

impl MemorySessionTicketRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionTicketRegistry for MemorySessionTicketRegistry {
    async fn record(
        &self,
        service_ticket: &str,
        session_key: &str,
    ) -> DbResult<SessionServiceTicket> {
        let mut by_ticket = self.by_ticket.write().await;
        if by_ticket.contains_key(service_ticket) {
            return Err(DbError::Conflict(
                "Service ticket is already linked to a session".into(),
            ));
        }
        let mapping = SessionServiceTicket {
            service_ticket: service_ticket.to_string(),
            session_key: session_key.to_string(),
            created_at: Utc::now(),
        };
        by_ticket.insert(service_ticket.to_string(), mapping.clone());
        Ok(mapping)
    }

    async fn lookup(&self, service_ticket: &str) -> DbResult<Option<String>> {
        Ok(self
            .by_ticket
            .read()
            .await
            .get(service_ticket)
            .map(|m| m.session_key.clone()))
    }

    async fn delete_by_session_key(&self, session_key: &str) -> DbResult<u64> {
        let mut by_ticket = self.by_ticket.write().await;
        let before = by_ticket.len();
        by_ticket.retain(|_, m| m.session_key != session_key);
        Ok((before - by_ticket.len()) as u64)
    }
}
