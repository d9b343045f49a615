//! Client address resolution behind reverse proxies.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

use crate::config::TrustedProxiesConfig;

/// Determine the address of the client that sent a request.
///
/// Proxy headers are only honoured when the connecting peer is a trusted
/// proxy. The forwarding header is read right to left, skipping trusted
/// hops, so a client cannot prepend a spoofed address.
pub fn client_ip(
    headers: &HeaderMap,
    connecting_addr: Option<SocketAddr>,
    trusted_proxies: &TrustedProxiesConfig,
) -> Option<IpAddr> {
    let connecting_ip = connecting_addr.map(|addr| addr.ip());

    if !trusted_proxies.enabled() {
        return connecting_ip;
    }

    let networks = trusted_proxies.networks();

    let should_trust_headers = match connecting_ip {
        Some(ip) => trusted_proxies.trusts(ip, &networks),
        None => trusted_proxies.dangerously_trust_all,
    };

    if !should_trust_headers {
        if let Some(ip) = connecting_ip
            && headers.contains_key(trusted_proxies.real_ip_header.as_str())
        {
            tracing::debug!(
                connecting_ip = %ip,
                header = %trusted_proxies.real_ip_header,
                "Ignoring proxy header from untrusted peer"
            );
        }
        return connecting_ip;
    }

    if let Some(header_value) = headers.get(trusted_proxies.real_ip_header.as_str())
        && let Ok(header_str) = header_value.to_str()
    {
        let ips: Vec<IpAddr> = header_str
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();

        if trusted_proxies.dangerously_trust_all {
            if let Some(first) = ips.first() {
                return Some(*first);
            }
        } else if let Some(ip) = ips
            .into_iter()
            .rev()
            .find(|&ip| !trusted_proxies.trusts(ip, &networks))
        {
            return Some(ip);
        }
    }

    if let Some(header_value) = headers.get("X-Real-IP")
        && let Ok(header_str) = header_value.to_str()
        && let Ok(ip) = header_str.trim().parse::<IpAddr>()
    {
        return Some(ip);
    }

    connecting_ip
}
