use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A local principal, created on first successful CAS login.
///
/// CAS only asserts a username; nothing else about the account is known or
/// stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Username exactly as asserted by the CAS server.
    pub username: String,
    pub created_at: DateTime<Utc>,
}
