//! HTTP access to the CAS server.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::CasConfig;

/// Largest response body accepted from the CAS server.
const MAX_RESPONSE_BYTES: usize = 256 * 1024;

/// A request to the CAS server did not produce a usable body.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("CAS server request failed: {0}")]
    Transport(String),

    #[error("CAS server did not answer within {0:?}")]
    Timeout(Duration),

    #[error("CAS server returned HTTP {0}")]
    Status(u16),

    #[error("CAS response exceeds {MAX_RESPONSE_BYTES} bytes")]
    TooLarge,
}

#[derive(Debug, Error)]
pub enum CasClientError {
    #[error("invalid CAS server URL '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

/// Thin wrapper around `reqwest` that knows the CAS server's base URL and
/// enforces timeouts and a body size limit on every call.
#[derive(Debug, Clone)]
pub struct CasClient {
    http_client: reqwest::Client,
    server_url: Url,
    timeout: Duration,
}

impl CasClient {
    /// Build a client with its own connection pool, configured from `config`.
    pub fn new(config: &CasConfig) -> Result<Self, CasClientError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http.timeout())
            .connect_timeout(config.http.connect_timeout())
            .user_agent(config.http.user_agent.clone())
            .build()
            .map_err(|e| CasClientError::Build(e.to_string()))?;
        Self::with_client(config, http_client)
    }

    /// Use an existing HTTP client. The configured total timeout is still
    /// applied per request.
    pub fn with_client(
        config: &CasConfig,
        http_client: reqwest::Client,
    ) -> Result<Self, CasClientError> {
        Ok(Self {
            http_client,
            server_url: base_url(&config.server_url)?,
            timeout: config.http.timeout(),
        })
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    /// Resolve `path` (e.g. `proxyValidate`) against the server URL.
    pub fn endpoint(&self, path: &str) -> Url {
        // `server_url` always ends with '/', so joining appends a segment
        self.server_url
            .join(path)
            .unwrap_or_else(|_| self.server_url.clone())
    }

    /// GET `path` with `query` and return the raw body of a 2xx response.
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<u8>, FetchError> {
        let mut url = self.endpoint(path);
        url.query_pairs_mut().extend_pairs(query);

        tracing::debug!(endpoint = %path, "Calling CAS server");

        let mut response = self
            .http_client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(endpoint = %path, status = %status, "CAS server returned an error status");
            return Err(FetchError::Status(status.as_u16()));
        }

        if response
            .content_length()
            .is_some_and(|len| len > MAX_RESPONSE_BYTES as u64)
        {
            return Err(FetchError::TooLarge);
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
            if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
                return Err(FetchError::TooLarge);
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Parse the server URL and make sure its path ends with '/', so that
/// `https://sso/cas` and `https://sso/cas/` resolve endpoints the same way.
pub(crate) fn base_url(raw: &str) -> Result<Url, CasClientError> {
    let invalid = |reason: String| CasClientError::InvalidServerUrl {
        url: raw.to_string(),
        reason,
    };
    let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("not a base URL".into()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
