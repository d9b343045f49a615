use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::SessionError;
use crate::cas::ProxyError;

/// JSON error body: `{"error": {"type": ..., "code": ..., "message": ...}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn with_type(
        error_type: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorInfo {
                error_type: error_type.into(),
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

/// Errors surfaced by the HTTP routes.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No valid session cookie.
    #[error("Not logged in")]
    SessionNotFound,

    /// The CAS ticket could not be validated. The cause has already been
    /// logged; clients only learn that login failed.
    #[error("Login failed")]
    LoginFailed,

    /// Logout notification from a sender outside the allow-list.
    #[error("Logout notification sender not allowed")]
    LogoutForbidden,

    /// Logout notification did not match a local session, or single
    /// sign-out is disabled.
    #[error("No such session")]
    NoSuchSession,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = match &self {
            AuthError::SessionNotFound => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "not_authenticated",
            ),
            AuthError::LoginFailed => (
                StatusCode::FORBIDDEN,
                "authentication_error",
                "login_failed",
            ),
            AuthError::LogoutForbidden => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "logout_forbidden",
            ),
            AuthError::NoSuchSession => {
                (StatusCode::NOT_FOUND, "not_found_error", "no_such_session")
            }
            AuthError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
            ),
            AuthError::Proxy(e) => match e {
                ProxyError::NotConfigured => (
                    StatusCode::NOT_FOUND,
                    "not_found_error",
                    "proxy_not_configured",
                ),
                ProxyError::NoTicketGrantingTicket { .. } => (
                    StatusCode::CONFLICT,
                    "proxy_error",
                    "no_proxy_granting_ticket",
                ),
                ProxyError::Rejected { .. } => {
                    (StatusCode::BAD_GATEWAY, "proxy_error", "proxy_rejected")
                }
                ProxyError::Network(_) => {
                    (StatusCode::BAD_GATEWAY, "upstream_error", "cas_unavailable")
                }
                ProxyError::MalformedResponse(_) => {
                    (StatusCode::BAD_GATEWAY, "upstream_error", "cas_bad_response")
                }
                ProxyError::Storage(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "storage_error",
                ),
            },
            AuthError::Session(_) | AuthError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal_error",
            ),
        };

        // Storage and internal details stay in the logs
        let message = match &self {
            AuthError::Internal(_)
            | AuthError::Session(_)
            | AuthError::Proxy(ProxyError::Storage(_)) => {
                tracing::error!(error = %self, "Request failed");
                "Internal error".to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse::with_type(error_type, code, message);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;
    use crate::db::DbError;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_session_not_found_is_401() {
        let response = AuthError::SessionNotFound.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "authentication_error");
        assert_eq!(json["error"]["code"], "not_authenticated");
    }

    #[test]
    fn test_proxy_error_statuses() {
        let cases = [
            (ProxyError::NotConfigured, StatusCode::NOT_FOUND),
            (
                ProxyError::NoTicketGrantingTicket {
                    username: "alice".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                ProxyError::Rejected {
                    code: "BAD_PGT".into(),
                    message: "expired".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(AuthError::from(error).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_storage_details_are_hidden() {
        let error = AuthError::from(ProxyError::Storage(DbError::Internal(
            "connection refused on 10.0.0.7".into(),
        )));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "Internal error");
    }
}
