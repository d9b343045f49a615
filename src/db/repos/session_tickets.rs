use async_trait::async_trait;

use crate::{db::error::DbResult, models::SessionServiceTicket};

/// Mapping from the service ticket used at login to the local session it
/// opened. Single sign-out uses it to find the session to terminate.
#[async_trait]
pub trait SessionTicketRegistry: Send + Sync {
    /// Link `service_ticket` to `session_key`.
    ///
    /// # Errors
    /// Returns `DbError::Conflict` if the ticket is already recorded. Service
    /// tickets are single-use, so a duplicate means a replay or a bug.
    async fn record(&self, service_ticket: &str, session_key: &str)
    -> DbResult<SessionServiceTicket>;

    /// Find the session opened with `service_ticket`.
    async fn lookup(&self, service_ticket: &str) -> DbResult<Option<String>>;

    /// Remove every mapping for `session_key`. Returns the number removed.
    async fn delete_by_session_key(&self, session_key: &str) -> DbResult<u64>;
}
