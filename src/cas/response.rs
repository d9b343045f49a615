//! CAS 2.0 response documents.
//!
//! The variant is chosen by the first element inside `serviceResponse`,
//! matched by local name so any namespace prefix is accepted.

use super::xml::{Element, XmlError, parse_document};

/// Body of a `/proxyValidate` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceResponse {
    Success {
        user: String,
        /// PGT IOU, only present when a `pgtUrl` was sent.
        proxy_granting_ticket: Option<String>,
        /// Proxies the ticket passed through, outermost first.
        proxies: Vec<String>,
    },
    Failure {
        code: String,
        message: String,
    },
}

/// Body of a `/proxy` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyResponse {
    Success { proxy_ticket: String },
    Failure { code: String, message: String },
}

/// The document could not be understood as the expected response.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MalformedResponse(pub String);

impl From<XmlError> for MalformedResponse {
    fn from(e: XmlError) -> Self {
        MalformedResponse(e.to_string())
    }
}

fn outcome_element(body: &[u8]) -> Result<Element, MalformedResponse> {
    let mut root = parse_document(body)?;
    if root.children.is_empty() {
        return Err(MalformedResponse(format!(
            "<{}> has no child element",
            root.name
        )));
    }
    Ok(root.children.swap_remove(0))
}

fn failure(element: &Element) -> (String, String) {
    (
        element.attribute("code").unwrap_or_default().to_owned(),
        element.text().to_owned(),
    )
}

fn non_empty_text(element: Option<&Element>) -> Option<String> {
    element
        .map(Element::text)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

impl ServiceResponse {
    pub fn parse(body: &[u8]) -> Result<Self, MalformedResponse> {
        let outcome = outcome_element(body)?;
        match outcome.name.as_str() {
            "authenticationSuccess" => {
                let user = non_empty_text(outcome.child("user")).ok_or_else(|| {
                    MalformedResponse("authenticationSuccess without a user".into())
                })?;
                let proxies = outcome
                    .child("proxies")
                    .map(|p| {
                        p.children_named("proxy")
                            .map(|proxy| proxy.text().to_owned())
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(ServiceResponse::Success {
                    user,
                    proxy_granting_ticket: non_empty_text(outcome.child("proxyGrantingTicket")),
                    proxies,
                })
            }
            "authenticationFailure" => {
                let (code, message) = failure(&outcome);
                Ok(ServiceResponse::Failure { code, message })
            }
            other => Err(MalformedResponse(format!(
                "unexpected element <{other}> in validation response"
            ))),
        }
    }
}

impl ProxyResponse {
    pub fn parse(body: &[u8]) -> Result<Self, MalformedResponse> {
        let outcome = outcome_element(body)?;
        match outcome.name.as_str() {
            "proxySuccess" => {
                let proxy_ticket = non_empty_text(outcome.child("proxyTicket")).ok_or_else(
                    || MalformedResponse("proxySuccess without a proxyTicket".into()),
                )?;
                Ok(ProxyResponse::Success { proxy_ticket })
            }
            "proxyFailure" => {
                let (code, message) = failure(&outcome);
                Ok(ProxyResponse::Failure { code, message })
            }
            other => Err(MalformedResponse(format!(
                "unexpected element <{other}> in proxy response"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const CAS_NS: &str = r#"xmlns:cas="http://www.yale.edu/tp/cas""#;

    #[test]
    fn test_success_with_pgt_and_proxies() {
        let body = format!(
            r#"<cas:serviceResponse {CAS_NS}>
                <cas:authenticationSuccess>
                    <cas:user>alice</cas:user>
                    <cas:proxyGrantingTicket>PGTIOU-84678-8a9d</cas:proxyGrantingTicket>
                    <cas:proxies>
                        <cas:proxy>https://proxy2/pgtUrl</cas:proxy>
                        <cas:proxy>https://proxy1/pgtUrl</cas:proxy>
                    </cas:proxies>
                </cas:authenticationSuccess>
            </cas:serviceResponse>"#
        );

        let parsed = ServiceResponse::parse(body.as_bytes()).unwrap();
        assert_eq!(
            parsed,
            ServiceResponse::Success {
                user: "alice".into(),
                proxy_granting_ticket: Some("PGTIOU-84678-8a9d".into()),
                proxies: vec!["https://proxy2/pgtUrl".into(), "https://proxy1/pgtUrl".into()],
            }
        );
    }

    #[rstest]
    #[case::cas_prefix(
        r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas"><cas:authenticationSuccess><cas:user>bob</cas:user></cas:authenticationSuccess></cas:serviceResponse>"#
    )]
    #[case::other_prefix(
        r#"<x:serviceResponse xmlns:x="http://www.yale.edu/tp/cas"><x:authenticationSuccess><x:user>bob</x:user></x:authenticationSuccess></x:serviceResponse>"#
    )]
    #[case::default_namespace(
        r#"<serviceResponse xmlns="http://www.yale.edu/tp/cas"><authenticationSuccess><user> bob </user></authenticationSuccess></serviceResponse>"#
    )]
    fn test_success_namespace_agnostic(#[case] body: &str) {
        let parsed = ServiceResponse::parse(body.as_bytes()).unwrap();
        assert_eq!(
            parsed,
            ServiceResponse::Success {
                user: "bob".into(),
                proxy_granting_ticket: None,
                proxies: vec![],
            }
        );
    }

    #[test]
    fn test_failure() {
        let body = format!(
            r#"<cas:serviceResponse {CAS_NS}>
                <cas:authenticationFailure code="INVALID_TICKET">
                    Ticket ST-1856339-aA5Yuvrxzpv8Tau1cYQ7 not recognized
                </cas:authenticationFailure>
            </cas:serviceResponse>"#
        );
        assert_eq!(
            ServiceResponse::parse(body.as_bytes()).unwrap(),
            ServiceResponse::Failure {
                code: "INVALID_TICKET".into(),
                message: "Ticket ST-1856339-aA5Yuvrxzpv8Tau1cYQ7 not recognized".into(),
            }
        );
    }

    #[rstest]
    #[case::not_xml("this is not xml")]
    #[case::empty("")]
    #[case::no_outcome("<cas:serviceResponse/>")]
    #[case::unknown_outcome(
        "<cas:serviceResponse><cas:somethingElse/></cas:serviceResponse>"
    )]
    #[case::missing_user(
        "<cas:serviceResponse><cas:authenticationSuccess/></cas:serviceResponse>"
    )]
    #[case::blank_user(
        "<cas:serviceResponse><cas:authenticationSuccess><cas:user> </cas:user></cas:authenticationSuccess></cas:serviceResponse>"
    )]
    #[case::truncated("<cas:serviceResponse><cas:authenticationSuccess>")]
    fn test_malformed_service_response(#[case] body: &str) {
        assert!(ServiceResponse::parse(body.as_bytes()).is_err());
    }

    #[test]
    fn test_proxy_success_and_failure() {
        let ok = format!(
            r#"<cas:serviceResponse {CAS_NS}><cas:proxySuccess><cas:proxyTicket>PT-957-ZuucXqTZ1YcJw81T3dxf</cas:proxyTicket></cas:proxySuccess></cas:serviceResponse>"#
        );
        assert_eq!(
            ProxyResponse::parse(ok.as_bytes()).unwrap(),
            ProxyResponse::Success {
                proxy_ticket: "PT-957-ZuucXqTZ1YcJw81T3dxf".into()
            }
        );

        let refused = format!(
            r#"<cas:serviceResponse {CAS_NS}><cas:proxyFailure code="INVALID_REQUEST">'pgt' and 'targetService' parameters are both required</cas:proxyFailure></cas:serviceResponse>"#
        );
        assert_eq!(
            ProxyResponse::parse(refused.as_bytes()).unwrap(),
            ProxyResponse::Failure {
                code: "INVALID_REQUEST".into(),
                message: "'pgt' and 'targetService' parameters are both required".into(),
            }
        );
    }

    #[test]
    fn test_proxy_response_rejects_validation_document() {
        let body = "<cas:serviceResponse><cas:authenticationSuccess><cas:user>a</cas:user></cas:authenticationSuccess></cas:serviceResponse>";
        assert!(ProxyResponse::parse(body.as_bytes()).is_err());
    }
}
