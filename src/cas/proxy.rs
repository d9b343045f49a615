//! Proxy ticket issuance.

use std::sync::Arc;

use super::{client::CasClient, error::ProxyError, response::ProxyResponse};
use crate::{db::TicketStore, observability::metrics};

/// Obtains proxy tickets from the CAS server using the stored PGT of a
/// user, so this service can call another CAS-protected service as them.
pub struct ProxyTicketManager {
    client: CasClient,
    tickets: Arc<dyn TicketStore>,
    enabled: bool,
}

impl ProxyTicketManager {
    /// `enabled` is false when no proxy callback URL is configured, in which
    /// case no PGT can ever have been delivered.
    pub fn new(client: CasClient, tickets: Arc<dyn TicketStore>, enabled: bool) -> Self {
        Self {
            client,
            tickets,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[tracing::instrument(skip(self))]
    pub async fn issue_proxy_ticket(
        &self,
        username: &str,
        target_service: &str,
    ) -> Result<String, ProxyError> {
        let result = self.issue_inner(username, target_service).await;
        match &result {
            Ok(_) => {
                metrics::record_proxy_ticket("success");
                tracing::info!("Issued proxy ticket");
            }
            Err(e) => {
                metrics::record_proxy_ticket(e.outcome());
                tracing::warn!(error = %e, "Proxy ticket request failed");
            }
        }
        result
    }

    async fn issue_inner(&self, username: &str, target_service: &str) -> Result<String, ProxyError> {
        if !self.enabled {
            return Err(ProxyError::NotConfigured);
        }

        let tgt = self
            .tickets
            .get_tgt(username)
            .await?
            .ok_or_else(|| ProxyError::NoTicketGrantingTicket {
                username: username.to_string(),
            })?;

        let body = self
            .client
            .get("proxy", &[("pgt", tgt.tgt.as_str()), ("targetService", target_service)])
            .await?;

        match ProxyResponse::parse(&body).map_err(|e| ProxyError::MalformedResponse(e.to_string()))? {
            ProxyResponse::Success { proxy_ticket } => Ok(proxy_ticket),
            ProxyResponse::Failure { code, message } => Err(ProxyError::Rejected { code, message }),
        }
    }
}
