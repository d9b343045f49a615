//! Turns a validated CAS ticket into a local user, and keeps the service
//! ticket registry in step with session logins and logouts.

use std::sync::Arc;

use super::{AuthBackend, AuthError, LocalSession};
use crate::{
    cas::TicketValidator,
    db::{DbError, SessionTicketRegistry, UserRepo},
    models::User,
    observability::ticket_prefix,
};

pub struct CasBackend {
    validator: Arc<TicketValidator>,
    users: Arc<dyn UserRepo>,
    session_tickets: Arc<dyn SessionTicketRegistry>,
    single_sign_out: bool,
}

impl CasBackend {
    pub fn new(
        validator: Arc<TicketValidator>,
        users: Arc<dyn UserRepo>,
        session_tickets: Arc<dyn SessionTicketRegistry>,
        single_sign_out: bool,
    ) -> Self {
        Self {
            validator,
            users,
            session_tickets,
            single_sign_out,
        }
    }

    /// Validate `ticket` for `service` and return the local user, created on
    /// first login. Any failure yields `None`; the reason is logged.
    #[tracing::instrument(skip(self, ticket), fields(ticket = %ticket_prefix(ticket)))]
    pub async fn authenticate(&self, ticket: &str, service: &str) -> Result<Option<User>, AuthError> {
        let validated = match self.validator.validate_service_ticket(ticket, service).await {
            Ok(validated) => validated,
            Err(e) => {
                tracing::debug!(error = %e, "Authentication failed");
                return Ok(None);
            }
        };
        let user = self
            .users
            .get_or_create(&validated.username)
            .await
            .map_err(|e| AuthError::Internal(format!("failed to load user: {e}")))?;
        Ok(Some(user))
    }

    /// Remember which service ticket opened `session`, so a later logout
    /// notification can find it.
    pub async fn on_login_success(&self, session: &LocalSession, ticket: &str) {
        if !self.single_sign_out || session.backend != AuthBackend::Cas {
            return;
        }
        match self.session_tickets.record(ticket, &session.key()).await {
            Ok(_) => {}
            Err(DbError::Conflict(_)) => {
                tracing::warn!(
                    ticket = %ticket_prefix(ticket),
                    "Service ticket already mapped to a session; keeping the existing mapping"
                );
            }
            Err(e) => {
                tracing::error!(
                    ticket = %ticket_prefix(ticket),
                    error = %e,
                    "Failed to record service ticket; single sign-out will not reach this session"
                );
            }
        }
    }

    /// Forget the service tickets of a session that is going away.
    pub async fn on_logout(&self, session: &LocalSession) {
        if session.backend != AuthBackend::Cas {
            return;
        }
        if let Err(e) = self.session_tickets.delete_by_session_key(&session.key()).await {
            tracing::warn!(session = %session.id, error = %e, "Failed to remove service ticket mappings");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

    use super::*;
    use crate::{
        cas::{CasClient, PgtCorrelator, tests::test_config},
        config::CorrelationConfig,
        db::memory::{MemorySessionTicketRegistry, MemoryTicketStore, MemoryUserRepo},
    };

    struct Harness {
        _server: MockServer,
        users: Arc<MemoryUserRepo>,
        registry: Arc<MemorySessionTicketRegistry>,
        backend: CasBackend,
    }

    async fn harness(body: &str, single_sign_out: bool) -> Harness {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let correlator = Arc::new(PgtCorrelator::new(
            Arc::new(MemoryTicketStore::new()),
            &CorrelationConfig::default(),
        ));
        let validator = Arc::new(TicketValidator::new(
            CasClient::new(&config).unwrap(),
            None,
            correlator,
        ));
        let users = Arc::new(MemoryUserRepo::new());
        let registry = Arc::new(MemorySessionTicketRegistry::new());
        let backend = CasBackend::new(validator, users.clone(), registry.clone(), single_sign_out);
        Harness {
            _server: server,
            users,
            registry,
            backend,
        }
    }

    const ALICE: &str = r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas"><cas:authenticationSuccess><cas:user>alice</cas:user></cas:authenticationSuccess></cas:serviceResponse>"#;
    const REJECTED: &str = r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas"><cas:authenticationFailure code="INVALID_TICKET">nope</cas:authenticationFailure></cas:serviceResponse>"#;

    fn session(backend: AuthBackend) -> LocalSession {
        LocalSession::new(Uuid::new_v4(), "alice", backend, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_authenticate_creates_user_once() {
        let h = harness(ALICE, true).await;

        let first = h.backend.authenticate("ST-1", "https://app/").await.unwrap().unwrap();
        let second = h.backend.authenticate("ST-2", "https://app/").await.unwrap().unwrap();

        assert_eq!(first.username, "alice");
        assert_eq!(first.id, second.id);
        assert!(h.users.get_by_username("alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_authenticate_failure_is_none() {
        let h = harness(REJECTED, true).await;
        assert!(h.backend.authenticate("ST-1", "https://app/").await.unwrap().is_none());
        assert!(h.users.get_by_username("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_and_logout_hooks_maintain_registry() {
        let h = harness(ALICE, true).await;
        let s = session(AuthBackend::Cas);

        h.backend.on_login_success(&s, "ST-1").await;
        assert_eq!(h.registry.lookup("ST-1").await.unwrap(), Some(s.key()));

        // Replayed ticket is ignored, first mapping wins
        let other = session(AuthBackend::Cas);
        h.backend.on_login_success(&other, "ST-1").await;
        assert_eq!(h.registry.lookup("ST-1").await.unwrap(), Some(s.key()));

        h.backend.on_logout(&s).await;
        assert_eq!(h.registry.lookup("ST-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hooks_skip_non_cas_sessions_and_disabled_sign_out() {
        let h = harness(ALICE, true).await;
        h.backend.on_login_success(&session(AuthBackend::Local), "ST-1").await;
        assert_eq!(h.registry.lookup("ST-1").await.unwrap(), None);

        let h = harness(ALICE, false).await;
        h.backend.on_login_success(&session(AuthBackend::Cas), "ST-1").await;
        assert_eq!(h.registry.lookup("ST-1").await.unwrap(), None);
    }
}
