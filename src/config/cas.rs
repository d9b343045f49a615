//! CAS client configuration.
//!
//! # Example
//!
//! ```toml
//! [cas]
//! server_url = "https://sso.example.edu/cas/"
//! service_base_url = "https://app.example.edu"
//! proxy_callback_url = "https://app.example.edu/cas/proxy-callback"
//!
//! [cas.correlation]
//! extra_lookups = 3
//! retry_interval_ms = 1000
//!
//! [cas.logout_allowed]
//! cidrs = ["10.20.0.0/16"]
//! hosts = ["sso.example.edu"]
//! ```

use std::{collections::BTreeMap, time::Duration};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use url::Url;

use super::ConfigError;

/// Hard ceiling on lookups after the first. Each one holds a login request
/// open, so the policy must stay bounded no matter what is configured.
pub const MAX_CORRELATION_EXTRA_LOOKUPS: u32 = 10;

/// Hard ceiling on the pause between correlation lookups.
pub const MAX_CORRELATION_INTERVAL_MS: u64 = 5_000;

/// Remote CAS server and local service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CasConfig {
    /// Base URL of the CAS server; `login`, `logout`, `proxyValidate` and
    /// `proxy` are resolved against it.
    pub server_url: String,

    /// Externally visible origin of this service. Service URLs sent to the
    /// CAS server are built from this value, never from the request's Host
    /// header.
    pub service_base_url: String,

    /// Path of the login route, appended to `service_base_url` to form the
    /// service URL.
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Absolute URL the CAS server calls back with `pgtIou`/`pgtId`.
    /// Proxy tickets are only available when this is set.
    #[serde(default)]
    pub proxy_callback_url: Option<String>,

    /// Honour logout notifications from the CAS server.
    #[serde(default = "default_true")]
    pub single_sign_out: bool,

    /// Log out of the CAS server as well as the local session.
    #[serde(default = "default_true")]
    pub logout_completely: bool,

    /// Send the user back to the CAS login page when validation fails,
    /// instead of answering 403.
    #[serde(default)]
    pub retry_login: bool,

    /// Ignore the Referer header when choosing where to go after login.
    #[serde(default)]
    pub ignore_referer: bool,

    /// Fallback redirect target after login or logout. Must be a relative
    /// path.
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,

    /// Extra query parameters appended to the CAS login URL
    /// (e.g. `renew = "true"`).
    #[serde(default)]
    pub extra_login_params: BTreeMap<String, String>,

    /// Outbound HTTP settings for calls to the CAS server.
    #[serde(default)]
    pub http: CasHttpConfig,

    /// PGT IOU correlation policy.
    #[serde(default)]
    pub correlation: CorrelationConfig,

    /// Origins allowed to deliver single sign-out notifications.
    #[serde(default)]
    pub logout_allowed: LogoutAllowedConfig,
}

impl CasConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = parse_http_url("cas.server_url", &self.server_url)?;
        if server.cannot_be_a_base() {
            return Err(ConfigError::Validation(
                "cas.server_url must be a base URL".into(),
            ));
        }
        parse_http_url("cas.service_base_url", &self.service_base_url)?;
        if let Some(callback) = &self.proxy_callback_url {
            let url = parse_http_url("cas.proxy_callback_url", callback)?;
            if url.scheme() != "https" {
                tracing::warn!(
                    url = %callback,
                    "cas.proxy_callback_url is not HTTPS; most CAS servers refuse to deliver PGTs over plain HTTP"
                );
            }
        }
        if !self.login_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "cas.login_path must start with '/'".into(),
            ));
        }
        if !is_relative_path(&self.redirect_url) {
            return Err(ConfigError::Validation(
                "cas.redirect_url must be a relative path starting with '/'".into(),
            ));
        }
        self.http.validate()?;
        self.correlation.validate()?;
        self.logout_allowed.validate()?;
        Ok(())
    }

    /// Whether proxy-granting tickets can be obtained for this deployment.
    pub fn proxy_enabled(&self) -> bool {
        self.proxy_callback_url.is_some()
    }
}

fn parse_http_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::Validation(format!("{field}: invalid URL '{value}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Validation(format!(
            "{field}: unsupported scheme '{other}'"
        ))),
    }
}

/// Relative path check used for redirect targets: must start with a single
/// '/' and must not be protocol-relative (`//host`). Backslashes, control
/// characters and whitespace are refused outright, since browsers drop tabs
/// and newlines while parsing (`/\t/host` becomes `//host`) and treat `\`
/// like `/`.
pub(crate) fn is_relative_path(target: &str) -> bool {
    target.starts_with('/')
        && !target.starts_with("//")
        && !target
            .chars()
            .any(|c| c == '\\' || c.is_ascii_control() || c.is_whitespace())
}

fn default_login_path() -> String {
    "/cas/login".to_string()
}

fn default_redirect_url() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Timeouts and identification for requests to the CAS server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CasHttpConfig {
    /// Total request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// TCP connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// User-Agent header sent to the CAS server.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CasHttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl CasHttpConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "cas.http.timeout_secs must be at least 1".into(),
            ));
        }
        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > self.timeout_secs {
            return Err(ConfigError::Validation(
                "cas.http.connect_timeout_secs must be between 1 and timeout_secs".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_user_agent() -> String {
    concat!("casgate/", env!("CARGO_PKG_VERSION")).to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// PGT correlation
// ─────────────────────────────────────────────────────────────────────────────

/// Bounded polling policy for matching a PGT IOU from `/proxyValidate` with
/// the PGT delivered to the proxy callback.
///
/// One lookup is made immediately, then up to `extra_lookups` more, each
/// after a `retry_interval_ms` pause. `extra_lookups = 3` therefore means
/// four lookups in total. Worst-case added login latency is
/// `extra_lookups * retry_interval_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrelationConfig {
    #[serde(default = "default_extra_lookups")]
    pub extra_lookups: u32,

    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            extra_lookups: default_extra_lookups(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl CorrelationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CORRELATION_EXTRA_LOOKUPS).contains(&self.extra_lookups) {
            return Err(ConfigError::Validation(format!(
                "cas.correlation.extra_lookups must be between 1 and {MAX_CORRELATION_EXTRA_LOOKUPS}"
            )));
        }
        if !(1..=MAX_CORRELATION_INTERVAL_MS).contains(&self.retry_interval_ms) {
            return Err(ConfigError::Validation(format!(
                "cas.correlation.retry_interval_ms must be between 1 and {MAX_CORRELATION_INTERVAL_MS}"
            )));
        }
        Ok(())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

fn default_extra_lookups() -> u32 {
    3
}

fn default_retry_interval_ms() -> u64 {
    1000
}

// ─────────────────────────────────────────────────────────────────────────────
// Single sign-out origins
// ─────────────────────────────────────────────────────────────────────────────

/// Allow-list for the sender of logout notifications. When both lists are
/// empty every sender is accepted.
///
/// Host entries are matched against the reverse DNS name of the client
/// address. Reverse DNS is controlled by whoever owns the address block, and
/// NAT or proxies hide the real sender, so host matching is a convenience,
/// not an authentication mechanism. Prefer CIDRs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogoutAllowedConfig {
    /// CIDR ranges (e.g. `["10.20.0.0/16"]`).
    #[serde(default)]
    pub cidrs: Vec<String>,

    /// Host names, compared case-insensitively with the PTR record of the
    /// client address. Requires the `reverse-dns` feature.
    #[serde(default)]
    pub hosts: Vec<String>,
}

impl LogoutAllowedConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for cidr in &self.cidrs {
            cidr.parse::<IpNet>().map_err(|e| {
                ConfigError::Validation(format!(
                    "cas.logout_allowed.cidrs: invalid CIDR '{cidr}': {e}"
                ))
            })?;
        }
        #[cfg(not(feature = "reverse-dns"))]
        if !self.hosts.is_empty() {
            return Err(ConfigError::Validation(
                "cas.logout_allowed.hosts requires the 'reverse-dns' feature".into(),
            ));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.cidrs.is_empty() && self.hosts.is_empty()
    }
}
