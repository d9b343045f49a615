//! Who may send single sign-out notifications.
//!
//! With an empty allow-list every sender is accepted. Otherwise the sender
//! address must fall in one of the configured CIDRs, or its reverse DNS name
//! must be one of the configured hosts. Reverse DNS is controlled by the
//! owner of the address block, so host matching narrows the set of senders
//! but does not authenticate them.

use std::{net::IpAddr, sync::Arc};

use async_trait::async_trait;
use ipnet::IpNet;

use crate::config::{ConfigError, LogoutAllowedConfig};

/// Decides whether a logout notification from `remote_addr` is honoured.
#[async_trait]
pub trait LogoutOriginPolicy: Send + Sync {
    async fn is_allowed(&self, remote_addr: Option<IpAddr>) -> bool;
}

/// Accepts every sender.
pub struct AllowAll;

#[async_trait]
impl LogoutOriginPolicy for AllowAll {
    async fn is_allowed(&self, _remote_addr: Option<IpAddr>) -> bool {
        true
    }
}

/// Reverse name lookup for an address.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Primary name for `addr`, if it has one.
    async fn reverse(&self, addr: IpAddr) -> Option<String>;
}

/// Allow-list of CIDR ranges and host names.
pub struct AllowListPolicy {
    cidrs: Vec<IpNet>,
    hosts: Vec<String>,
    resolver: Option<Arc<dyn HostResolver>>,
}

impl AllowListPolicy {
    pub fn new(cidrs: Vec<IpNet>, hosts: Vec<String>, resolver: Option<Arc<dyn HostResolver>>) -> Self {
        Self {
            cidrs,
            hosts: hosts.into_iter().map(|h| normalize_host(&h)).collect(),
            resolver,
        }
    }

    async fn host_allowed(&self, addr: IpAddr) -> bool {
        if self.hosts.is_empty() {
            return false;
        }
        let Some(resolver) = &self.resolver else {
            return false;
        };
        match resolver.reverse(addr).await {
            Some(name) => {
                let name = normalize_host(&name);
                let allowed = self.hosts.contains(&name);
                if !allowed {
                    tracing::debug!(%addr, host = %name, "Reverse DNS name not in logout allow-list");
                }
                allowed
            }
            None => {
                tracing::debug!(%addr, "No reverse DNS name for logout sender");
                false
            }
        }
    }
}

#[async_trait]
impl LogoutOriginPolicy for AllowListPolicy {
    async fn is_allowed(&self, remote_addr: Option<IpAddr>) -> bool {
        let Some(addr) = remote_addr else {
            tracing::warn!("Logout notification without a client address; rejecting");
            return false;
        };
        if self.cidrs.iter().any(|net| net.contains(&addr)) {
            return true;
        }
        self.host_allowed(addr).await
    }
}

fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Build the policy described by `config`.
pub fn policy_from_config(
    config: &LogoutAllowedConfig,
) -> Result<Arc<dyn LogoutOriginPolicy>, ConfigError> {
    if config.is_empty() {
        return Ok(Arc::new(AllowAll));
    }

    let cidrs = config
        .cidrs
        .iter()
        .map(|c| {
            c.parse::<IpNet>().map_err(|e| {
                ConfigError::Validation(format!("cas.logout_allowed.cidrs: invalid CIDR '{c}': {e}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let resolver: Option<Arc<dyn HostResolver>> = if config.hosts.is_empty() {
        None
    } else {
        host_resolver()?
    };

    Ok(Arc::new(AllowListPolicy::new(
        cidrs,
        config.hosts.clone(),
        resolver,
    )))
}

#[cfg(feature = "reverse-dns")]
fn host_resolver() -> Result<Option<Arc<dyn HostResolver>>, ConfigError> {
    Ok(Some(Arc::new(dns::DnsHostResolver::from_system_conf()?)))
}

#[cfg(not(feature = "reverse-dns"))]
fn host_resolver() -> Result<Option<Arc<dyn HostResolver>>, ConfigError> {
    Err(ConfigError::Validation(
        "cas.logout_allowed.hosts requires the 'reverse-dns' feature".into(),
    ))
}

#[cfg(feature = "reverse-dns")]
pub mod dns {
    use std::net::IpAddr;

    use async_trait::async_trait;
    use hickory_resolver::{
        Resolver, TokioResolver, name_server::TokioConnectionProvider,
        system_conf::read_system_conf,
    };

    use super::HostResolver;
    use crate::config::ConfigError;

    /// PTR lookups through hickory.
    pub struct DnsHostResolver {
        resolver: TokioResolver,
    }

    impl DnsHostResolver {
        /// Use the system's DNS configuration, falling back to hickory's
        /// defaults when it cannot be read.
        pub fn from_system_conf() -> Result<Self, ConfigError> {
            let resolver = match read_system_conf() {
                Ok((config, opts)) => {
                    Resolver::builder_with_config(config, TokioConnectionProvider::default())
                        .with_options(opts)
                        .build()
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Failed to read system DNS config, using default"
                    );
                    Resolver::builder_tokio()
                        .map_err(|e| {
                            ConfigError::Validation(format!("cannot create DNS resolver: {e}"))
                        })?
                        .build()
                }
            };
            Ok(Self { resolver })
        }

        pub fn with_resolver(resolver: TokioResolver) -> Self {
            Self { resolver }
        }
    }

    #[async_trait]
    impl HostResolver for DnsHostResolver {
        async fn reverse(&self, addr: IpAddr) -> Option<String> {
            match self.resolver.reverse_lookup(addr).await {
                Ok(lookup) => lookup.iter().next().map(|name| name.to_string()),
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "Reverse DNS lookup failed");
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct StaticResolver(HashMap<IpAddr, String>);

    #[async_trait]
    impl HostResolver for StaticResolver {
        async fn reverse(&self, addr: IpAddr) -> Option<String> {
            self.0.get(&addr).cloned()
        }
    }

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[tokio::test]
    async fn test_empty_config_allows_everyone() {
        let policy = policy_from_config(&LogoutAllowedConfig::default()).unwrap();
        assert!(policy.is_allowed(ip("203.0.113.9")).await);
        assert!(policy.is_allowed(None).await);
    }

    #[tokio::test]
    async fn test_cidr_allow_list() {
        let policy = policy_from_config(&LogoutAllowedConfig {
            cidrs: vec!["10.20.0.0/16".into(), "2001:db8::/32".into()],
            hosts: vec![],
        })
        .unwrap();

        assert!(policy.is_allowed(ip("10.20.3.4")).await);
        assert!(policy.is_allowed(ip("2001:db8::1")).await);
        assert!(!policy.is_allowed(ip("10.21.0.1")).await);
        assert!(!policy.is_allowed(None).await);
    }

    #[tokio::test]
    async fn test_host_allow_list_uses_reverse_name() {
        let resolver = StaticResolver(HashMap::from([
            ("192.0.2.10".parse().unwrap(), "SSO.Example.edu.".to_string()),
            ("192.0.2.11".parse().unwrap(), "mallory.example.net.".to_string()),
        ]));
        let policy = AllowListPolicy::new(
            vec![],
            vec!["sso.example.edu".into()],
            Some(Arc::new(resolver)),
        );

        assert!(policy.is_allowed(ip("192.0.2.10")).await);
        assert!(!policy.is_allowed(ip("192.0.2.11")).await);
        // No PTR record
        assert!(!policy.is_allowed(ip("192.0.2.12")).await);
    }

    #[tokio::test]
    async fn test_hosts_without_resolver_deny() {
        let policy = AllowListPolicy::new(vec![], vec!["sso.example.edu".into()], None);
        assert!(!policy.is_allowed(ip("192.0.2.10")).await);
    }

    #[test]
    fn test_invalid_cidr_rejected() {
        let result = policy_from_config(&LogoutAllowedConfig {
            cidrs: vec!["nope".into()],
            hosts: vec![],
        });
        assert!(result.is_err());
    }
}
