//! Service and proxy ticket validation against `/proxyValidate`.

use std::{sync::Arc, time::Instant};

use tokio_util::sync::CancellationToken;

use super::{
    client::CasClient,
    correlator::PgtCorrelator,
    error::ValidationError,
    response::ServiceResponse,
};
use crate::observability::{metrics, ticket_prefix};

/// Which kind of ticket is being presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TicketKind {
    /// A service ticket from an interactive login.
    #[default]
    Service,
    /// A proxy ticket presented by another service on a user's behalf.
    Proxy,
}

impl TicketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketKind::Service => "service",
            TicketKind::Proxy => "proxy",
        }
    }
}

/// A ticket the CAS server vouched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTicket {
    pub username: String,
    /// Proxy chain, outermost first. `None` for service tickets.
    pub proxies: Option<Vec<String>>,
}

pub struct TicketValidator {
    client: CasClient,
    /// Sent as `pgtUrl` when set.
    proxy_callback_url: Option<String>,
    correlator: Arc<PgtCorrelator>,
}

impl TicketValidator {
    pub fn new(
        client: CasClient,
        proxy_callback_url: Option<String>,
        correlator: Arc<PgtCorrelator>,
    ) -> Self {
        Self {
            client,
            proxy_callback_url,
            correlator,
        }
    }

    pub async fn validate_service_ticket(
        &self,
        ticket: &str,
        service: &str,
    ) -> Result<ValidatedTicket, ValidationError> {
        self.validate(ticket, service, TicketKind::Service).await
    }

    pub async fn validate_proxy_ticket(
        &self,
        ticket: &str,
        service: &str,
    ) -> Result<ValidatedTicket, ValidationError> {
        self.validate(ticket, service, TicketKind::Proxy).await
    }

    /// Like [`validate`](Self::validate), but gives up with
    /// [`ValidationError::Cancelled`] as soon as `cancel` fires.
    pub async fn validate_cancellable(
        &self,
        ticket: &str,
        service: &str,
        kind: TicketKind,
        cancel: &CancellationToken,
    ) -> Result<ValidatedTicket, ValidationError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(ticket = %ticket_prefix(ticket), "Ticket validation cancelled");
                metrics::record_cas_validation(kind.as_str(), "cancelled", 0.0);
                Err(ValidationError::Cancelled)
            }
            result = self.validate(ticket, service, kind) => result,
        }
    }

    /// Ask the CAS server whether `ticket` was issued for `service`.
    ///
    /// For service tickets a returned PGT IOU is correlated with the proxy
    /// callback before returning. Failing to correlate does not fail the
    /// login; the user just has no proxy capability.
    #[tracing::instrument(
        skip(self, ticket),
        fields(ticket = %ticket_prefix(ticket), kind = kind.as_str())
    )]
    pub async fn validate(
        &self,
        ticket: &str,
        service: &str,
        kind: TicketKind,
    ) -> Result<ValidatedTicket, ValidationError> {
        let started = Instant::now();
        let result = self.validate_inner(ticket, service, kind).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        metrics::record_cas_validation(kind.as_str(), outcome, started.elapsed().as_secs_f64());

        match &result {
            Ok(validated) => {
                tracing::info!(username = %validated.username, "CAS ticket validated");
            }
            Err(ValidationError::AuthenticationFailed { code, message }) => {
                tracing::info!(code = %code, message = %message, "CAS server rejected ticket");
            }
            Err(e) => {
                tracing::warn!(error = %e, "CAS ticket validation failed");
            }
        }
        result
    }

    async fn validate_inner(
        &self,
        ticket: &str,
        service: &str,
        kind: TicketKind,
    ) -> Result<ValidatedTicket, ValidationError> {
        let mut query = vec![("ticket", ticket), ("service", service)];
        if kind == TicketKind::Service
            && let Some(callback) = &self.proxy_callback_url
        {
            query.push(("pgtUrl", callback.as_str()));
        }

        let body = self.client.get("proxyValidate", &query).await?;
        let response = ServiceResponse::parse(&body)
            .map_err(|e| ValidationError::MalformedResponse(e.to_string()))?;

        match response {
            ServiceResponse::Failure { code, message } => {
                Err(ValidationError::AuthenticationFailed { code, message })
            }
            ServiceResponse::Success {
                user,
                proxy_granting_ticket,
                proxies,
            } => match kind {
                TicketKind::Service => {
                    if let Some(iou) = proxy_granting_ticket {
                        if let Err(e) = self.correlator.correlate(&user, &iou).await {
                            tracing::warn!(
                                username = %user,
                                error = %e,
                                "Could not obtain a proxy-granting ticket; continuing without proxy support"
                            );
                        }
                    }
                    Ok(ValidatedTicket {
                        username: user,
                        proxies: None,
                    })
                }
                TicketKind::Proxy => Ok(ValidatedTicket {
                    username: user,
                    proxies: Some(proxies),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param, query_param_is_missing},
    };

    use super::*;
    use crate::{
        cas::{client::FetchError, tests::test_config},
        config::CorrelationConfig,
        db::{TicketStore, memory::MemoryTicketStore},
    };

    const SERVICE: &str = "https://app.example.edu/cas/login?next=%2F";
    const CALLBACK: &str = "https://app.example.edu/cas/proxy-callback";

    fn success(user: &str, iou: Option<&str>) -> String {
        let pgt = iou
            .map(|iou| format!("<cas:proxyGrantingTicket>{iou}</cas:proxyGrantingTicket>"))
            .unwrap_or_default();
        format!(
            r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
                <cas:authenticationSuccess><cas:user>{user}</cas:user>{pgt}</cas:authenticationSuccess>
            </cas:serviceResponse>"#
        )
    }

    struct Harness {
        server: MockServer,
        store: Arc<MemoryTicketStore>,
        validator: TicketValidator,
    }

    async fn harness(proxy_callback: Option<&str>) -> Harness {
        harness_with_timeout(proxy_callback, 10).await
    }

    async fn harness_with_timeout(proxy_callback: Option<&str>, timeout_secs: u64) -> Harness {
        let server = MockServer::start().await;
        let mut config = test_config(&format!("{}/cas/", server.uri()));
        config.http.timeout_secs = timeout_secs;
        config.http.connect_timeout_secs = 1;
        config.proxy_callback_url = proxy_callback.map(str::to_owned);

        let store = Arc::new(MemoryTicketStore::new());
        let correlator = Arc::new(PgtCorrelator::new(
            store.clone(),
            &CorrelationConfig {
                extra_lookups: 1,
                retry_interval_ms: 10,
            },
        ));
        let validator = TicketValidator::new(
            CasClient::new(&config).unwrap(),
            config.proxy_callback_url.clone(),
            correlator,
        );
        Harness {
            server,
            store,
            validator,
        }
    }

    #[tokio::test]
    async fn test_valid_service_ticket() {
        let h = harness(None).await;
        Mock::given(method("GET"))
            .and(path("/cas/proxyValidate"))
            .and(query_param("ticket", "ST-1"))
            .and(query_param("service", SERVICE))
            .and(query_param_is_missing("pgtUrl"))
            .respond_with(ResponseTemplate::new(200).set_body_string(success("alice", None)))
            .expect(1)
            .mount(&h.server)
            .await;

        let validated = h.validator.validate_service_ticket("ST-1", SERVICE).await.unwrap();
        assert_eq!(
            validated,
            ValidatedTicket {
                username: "alice".into(),
                proxies: None,
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_ticket() {
        let h = harness(None).await;
        Mock::given(method("GET"))
            .and(path("/cas/proxyValidate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
                    <cas:authenticationFailure code="INVALID_TICKET">Ticket ST-1 not recognized</cas:authenticationFailure>
                </cas:serviceResponse>"#,
            ))
            .mount(&h.server)
            .await;

        let err = h.validator.validate_service_ticket("ST-1", SERVICE).await.unwrap_err();
        assert_eq!(err.outcome(), "failure");
        match err {
            ValidationError::AuthenticationFailed { code, message } => {
                assert_eq!(code, "INVALID_TICKET");
                assert_eq!(message, "Ticket ST-1 not recognized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pgt_url_sent_and_correlated_when_configured() {
        let h = harness(Some(CALLBACK)).await;
        h.store.put_pgt_iou("PGTIOU-1", "PGT-1").await.unwrap();
        Mock::given(method("GET"))
            .and(path("/cas/proxyValidate"))
            .and(query_param("pgtUrl", CALLBACK))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(success("alice", Some("PGTIOU-1"))),
            )
            .expect(1)
            .mount(&h.server)
            .await;

        let validated = h.validator.validate_service_ticket("ST-1", SERVICE).await.unwrap();
        assert_eq!(validated.username, "alice");
        assert_eq!(h.store.get_tgt("alice").await.unwrap().unwrap().tgt, "PGT-1");
        assert!(h.store.take_pgt_iou("PGTIOU-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_callback_does_not_fail_login() {
        let h = harness(Some(CALLBACK)).await;
        Mock::given(method("GET"))
            .and(path("/cas/proxyValidate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(success("alice", Some("PGTIOU-404"))),
            )
            .mount(&h.server)
            .await;

        let validated = h.validator.validate_service_ticket("ST-1", SERVICE).await.unwrap();
        assert_eq!(validated.username, "alice");
        assert!(h.store.get_tgt("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_proxy_ticket_returns_chain_without_pgt_url() {
        let h = harness(Some(CALLBACK)).await;
        Mock::given(method("GET"))
            .and(path("/cas/proxyValidate"))
            .and(query_param("ticket", "PT-1"))
            .and(query_param_is_missing("pgtUrl"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
                    <cas:authenticationSuccess>
                        <cas:user>alice</cas:user>
                        <cas:proxies>
                            <cas:proxy>https://outer.example.edu/cb</cas:proxy>
                            <cas:proxy>https://inner.example.edu/cb</cas:proxy>
                        </cas:proxies>
                    </cas:authenticationSuccess>
                </cas:serviceResponse>"#,
            ))
            .expect(1)
            .mount(&h.server)
            .await;

        let validated = h.validator.validate_proxy_ticket("PT-1", SERVICE).await.unwrap();
        assert_eq!(validated.username, "alice");
        assert_eq!(
            validated.proxies,
            Some(vec![
                "https://outer.example.edu/cb".to_string(),
                "https://inner.example.edu/cb".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn test_proxy_ticket_without_chain_has_empty_list() {
        let h = harness(None).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(success("alice", None)))
            .mount(&h.server)
            .await;

        let validated = h.validator.validate_proxy_ticket("PT-1", SERVICE).await.unwrap();
        assert_eq!(validated.proxies, Some(vec![]));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let h = harness(None).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&h.server)
            .await;

        let err = h.validator.validate_service_ticket("ST-1", SERVICE).await.unwrap_err();
        assert!(matches!(err, ValidationError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_network_failure() {
        let h = harness(None).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&h.server)
            .await;

        let err = h.validator.validate_service_ticket("ST-1", SERVICE).await.unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Network(FetchError::Status(500))
        ));
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let h = harness_with_timeout(None, 1).await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(success("alice", None))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&h.server)
            .await;

        let err = h.validator.validate_service_ticket("ST-1", SERVICE).await.unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Network(FetchError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let h = harness(None).await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(success("alice", None))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&h.server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = h
            .validator
            .validate_cancellable("ST-1", SERVICE, TicketKind::Service, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::Cancelled));
    }
}
