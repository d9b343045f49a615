use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored proxy-granting ticket for one user.
///
/// At most one row exists per username; each successful correlation
/// replaces the previous ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketGrantingTicket {
    pub username: String,
    pub tgt: String,
    pub updated_at: DateTime<Utc>,
}

/// A PGT delivered to the proxy callback, waiting to be matched with the IOU
/// returned by `/proxyValidate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgtIou {
    pub iou: String,
    pub tgt: String,
    pub created_at: DateTime<Utc>,
}

impl PgtIou {
    pub fn new(iou: impl Into<String>, tgt: impl Into<String>) -> Self {
        Self {
            iou: iou.into(),
            tgt: tgt.into(),
            created_at: Utc::now(),
        }
    }
}

/// Service ticket used to log in, linked to the local session it created.
/// Only consulted when the CAS server sends a logout notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionServiceTicket {
    pub service_ticket: String,
    pub session_key: String,
    pub created_at: DateTime<Utc>,
}
