use std::net::{IpAddr, Ipv4Addr};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// `[server]`: the listener and the proxies in front of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body. The biggest body this service expects
    /// is a SAML LogoutRequest from the CAS server.
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,

    #[serde(default)]
    pub trusted_proxies: TrustedProxiesConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit_bytes(),
            trusted_proxies: TrustedProxiesConfig::default(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit_bytes() -> usize {
    64 * 1024
}

/// `[server.trusted_proxies]`
///
/// The single sign-out origin check needs the real client address. Behind a
/// reverse proxy that address only arrives in a forwarding header, which is
/// believed only when the connecting peer falls inside `cidrs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustedProxiesConfig {
    /// Believe the forwarding header from any peer and take its leftmost
    /// address. Only safe behind a load balancer that rewrites the header.
    #[serde(default)]
    pub dangerously_trust_all: bool,

    /// Proxy networks, e.g. `["10.0.0.0/8"]`.
    #[serde(default)]
    pub cidrs: Vec<String>,

    #[serde(default = "default_forwarding_header")]
    pub real_ip_header: String,
}

impl Default for TrustedProxiesConfig {
    fn default() -> Self {
        Self {
            dangerously_trust_all: false,
            cidrs: Vec::new(),
            real_ip_header: default_forwarding_header(),
        }
    }
}

impl TrustedProxiesConfig {
    /// Whether forwarding headers may be consulted at all.
    pub fn enabled(&self) -> bool {
        self.dangerously_trust_all || !self.cidrs.is_empty()
    }

    /// Parsed `cidrs`. Entries that fail to parse are skipped; `validate`
    /// rejects them for configs loaded from a file.
    pub fn networks(&self) -> Vec<IpNet> {
        self.cidrs
            .iter()
            .filter_map(|cidr| match cidr.parse::<IpNet>() {
                Ok(net) => Some(net),
                Err(_) => {
                    tracing::warn!(cidr = %cidr, "Skipping unparseable trusted proxy CIDR");
                    None
                }
            })
            .collect()
    }

    pub fn trusts(&self, ip: IpAddr, networks: &[IpNet]) -> bool {
        self.dangerously_trust_all || networks.iter().any(|net| net.contains(&ip))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((cidr, err)) = self
            .cidrs
            .iter()
            .find_map(|cidr| cidr.parse::<IpNet>().err().map(|e| (cidr, e)))
        {
            return Err(ConfigError::Validation(format!(
                "server.trusted_proxies.cidrs: '{cidr}' is not a CIDR: {err}"
            )));
        }
        if self.real_ip_header.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.trusted_proxies.real_ip_header cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_forwarding_header() -> String {
    "X-Forwarded-For".to_string()
}
