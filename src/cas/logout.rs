//! Single sign-out: mapping CAS logout notifications to local sessions.
//!
//! The CAS server POSTs a SAML `LogoutRequest` whose `SessionIndex` holds the
//! service ticket the user logged in with. Nothing in here ever fails the
//! request: an unreadable or unknown notification is logged and ignored.

use std::{net::IpAddr, sync::Arc};

use super::xml::parse_document;
use crate::{db::SessionTicketRegistry, observability::ticket_prefix};

/// A logout notification as received over HTTP.
#[derive(Debug, Clone)]
pub struct LogoutNotification {
    /// Value of the `logoutRequest` form field.
    pub body: String,
    /// Address of the sender, if known.
    pub remote_addr: Option<IpAddr>,
}

/// A notification that matched a local session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLogout {
    pub ticket: String,
    pub session_key: String,
    pub remote_addr: Option<IpAddr>,
}

/// Extract the service ticket from a `LogoutRequest` document.
pub fn extract_session_index(body: &str) -> Option<String> {
    let root = match parse_document(body.as_bytes()) {
        Ok(root) => root,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unparseable logout notification");
            return None;
        }
    };
    let index = if root.name == "SessionIndex" {
        Some(&root)
    } else {
        root.find("SessionIndex")
    };
    match index.map(|e| e.text()).filter(|t| !t.is_empty()) {
        Some(ticket) => Some(ticket.to_string()),
        None => {
            tracing::warn!("Ignoring logout notification without a SessionIndex");
            None
        }
    }
}

pub struct SingleSignOutResolver {
    registry: Arc<dyn SessionTicketRegistry>,
}

impl SingleSignOutResolver {
    pub fn new(registry: Arc<dyn SessionTicketRegistry>) -> Self {
        Self { registry }
    }

    /// Find the local session a logout notification refers to.
    pub async fn resolve_session(&self, body: &str) -> Option<String> {
        let ticket = extract_session_index(body)?;
        self.lookup(&ticket).await
    }

    /// Like [`resolve_session`](Self::resolve_session), keeping the ticket
    /// and sender so the caller can apply its own origin checks.
    #[tracing::instrument(skip_all, fields(remote_addr = ?notification.remote_addr))]
    pub async fn resolve(&self, notification: &LogoutNotification) -> Option<ResolvedLogout> {
        let ticket = extract_session_index(&notification.body)?;
        let session_key = self.lookup(&ticket).await?;
        Some(ResolvedLogout {
            ticket,
            session_key,
            remote_addr: notification.remote_addr,
        })
    }

    async fn lookup(&self, ticket: &str) -> Option<String> {
        match self.registry.lookup(ticket).await {
            Ok(Some(session_key)) => Some(session_key),
            Ok(None) => {
                tracing::info!(
                    ticket = %ticket_prefix(ticket),
                    "No session matching this logout ticket"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    ticket = %ticket_prefix(ticket),
                    error = %e,
                    "Failed to look up session for logout ticket"
                );
                None
            }
        }
    }
}
