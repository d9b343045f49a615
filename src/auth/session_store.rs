//! Local sessions opened after a successful login.
//!
//! Sessions live in process memory: they are lost on restart and not shared
//! across nodes. The service ticket mappings used for single sign-out are
//! kept in the database, so a logout notification handled by another node
//! still removes the mapping even though it cannot reach this session.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session storage error: {0}")]
    Storage(String),
}

/// Which login mechanism opened a session. Only CAS sessions take part in
/// single sign-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthBackend {
    Cas,
    Local,
}

/// A logged-in browser session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub backend: AuthBackend,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LocalSession {
    pub fn new(user_id: Uuid, username: impl Into<String>, backend: AuthBackend, ttl: Duration) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            id: Uuid::new_v4(),
            user_id,
            username: username.into(),
            backend,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Key under which the session is referenced elsewhere (cookies, the
    /// service ticket registry).
    pub fn key(&self) -> String {
        self.id.to_string()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: LocalSession) -> SessionResult<Uuid>;

    /// Get a session by ID. Expired sessions are reported as absent.
    async fn get_session(&self, id: Uuid) -> SessionResult<Option<LocalSession>>;

    /// Delete a session. Returns whether it existed.
    async fn delete_session(&self, id: Uuid) -> SessionResult<bool>;

    /// Drop expired sessions and return them, so their single sign-out
    /// mappings can be removed too.
    async fn cleanup(&self) -> SessionResult<Vec<LocalSession>>;
}

pub type SharedSessionStore = Arc<dyn SessionStore>;

// ─────────────────────────────────────────────────────────────────────────────
// Memory Session Store
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory session store.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, LocalSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: LocalSession) -> SessionResult<Uuid> {
        let id = session.id;
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, session);
        Ok(id)
    }

    async fn get_session(&self, id: Uuid) -> SessionResult<Option<LocalSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id).filter(|s| !s.is_expired()).cloned())
    }

    async fn delete_session(&self, id: Uuid) -> SessionResult<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(&id).is_some())
    }

    async fn cleanup(&self) -> SessionResult<Vec<LocalSession>> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let expired: Vec<Uuid> = sessions
            .values()
            .filter(|s| s.expires_at <= now)
            .map(|s| s.id)
            .collect();
        Ok(expired.iter().filter_map(|id| sessions.remove(id)).collect())
    }
}
