use thiserror::Error;

use crate::{cas::client::FetchError, db::DbError};

/// Why a service or proxy ticket could not be validated.
///
/// Every variant is an authentication failure: the caller treats the login
/// as failed whichever one it gets. The variants only differ in how they are
/// logged and in their metric `outcome`.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("CAS server rejected the ticket ({code}): {message}")]
    AuthenticationFailed { code: String, message: String },

    #[error("malformed CAS response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Network(#[from] FetchError),

    #[error("validation cancelled")]
    Cancelled,
}

impl ValidationError {
    /// Label for the `outcome` metric dimension.
    pub fn outcome(&self) -> &'static str {
        match self {
            ValidationError::AuthenticationFailed { .. } => "failure",
            ValidationError::MalformedResponse(_) => "malformed",
            ValidationError::Network(_) => "network",
            ValidationError::Cancelled => "cancelled",
        }
    }
}

/// A PGT IOU could not be matched with its callback.
#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("no proxy callback arrived after {attempts} lookups")]
    Timeout { attempts: u32 },

    #[error("ticket store error: {0}")]
    Storage(#[from] DbError),
}

impl CorrelationError {
    pub fn outcome(&self) -> &'static str {
        match self {
            CorrelationError::Timeout { .. } => "timeout",
            CorrelationError::Storage(_) => "storage",
        }
    }
}

/// A proxy ticket could not be issued.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy tickets are not enabled (no proxy callback URL configured)")]
    NotConfigured,

    #[error("no proxy-granting ticket stored for user '{username}'")]
    NoTicketGrantingTicket { username: String },

    #[error("CAS server refused the proxy ticket ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error(transparent)]
    Network(#[from] FetchError),

    #[error("malformed CAS response: {0}")]
    MalformedResponse(String),

    #[error("ticket store error: {0}")]
    Storage(#[from] DbError),
}

impl ProxyError {
    pub fn outcome(&self) -> &'static str {
        match self {
            ProxyError::NotConfigured => "not_configured",
            ProxyError::NoTicketGrantingTicket { .. } => "no_tgt",
            ProxyError::Rejected { .. } => "rejected",
            ProxyError::Network(_) => "network",
            ProxyError::MalformedResponse(_) => "malformed",
            ProxyError::Storage(_) => "storage",
        }
    }
}

/// The CAS components could not be assembled from configuration.
#[derive(Debug, Error)]
pub enum CasSetupError {
    #[error(transparent)]
    Client(#[from] crate::cas::client::CasClientError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}
