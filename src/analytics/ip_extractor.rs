//! Client IP extraction from proxy headers with trust validation
//!
//! Forwarding headers are only honoured in `standard` or `cloudflare` mode.
//! In standard mode the X-Forwarded-For chain is walked right to left,
//! skipping either a fixed number of hops or any hop inside a trusted CIDR.

use axum::http::HeaderMap;
use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::warn;

use crate::config::{TrackingConfig, TrustedProxyMode};

/// Parsed trust settings, built once at startup
#[derive(Debug, Clone)]
pub struct ProxyTrust {
    mode: TrustedProxyMode,
    trusted: Vec<IpNet>,
    num_trusted: Option<usize>,
    anonymize: bool,
}

impl ProxyTrust {
    pub fn from_config(config: &TrackingConfig) -> Self {
        let trusted = config
            .trusted_proxies
            .iter()
            .filter_map(|cidr| match parse_net(cidr) {
                Some(net) => Some(net),
                None => {
                    warn!("Ignoring invalid trusted proxy range '{cidr}'");
                    None
                }
            })
            .collect();

        Self {
            mode: config.trusted_proxy_mode.clone(),
            trusted,
            num_trusted: config.num_trusted_proxies,
            anonymize: config.ip_anonymization,
        }
    }

    /// Client address for a request, anonymized when configured
    pub fn client_ip(&self, headers: &HeaderMap, socket_addr: IpAddr) -> IpAddr {
        let ip = match self.mode {
            TrustedProxyMode::Cloudflare => header_ip(headers, "cf-connecting-ip")
                .unwrap_or_else(|| {
                    warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
                    socket_addr
                }),
            TrustedProxyMode::Standard => {
                if self.trusted.is_empty() || self.is_trusted(socket_addr) {
                    self.forwarded_client(headers).unwrap_or(socket_addr)
                } else {
                    socket_addr
                }
            }
            TrustedProxyMode::None => socket_addr,
        };

        if self.anonymize {
            anonymize_ip(ip)
        } else {
            ip
        }
    }

    fn is_trusted(&self, ip: IpAddr) -> bool {
        self.trusted.iter().any(|net| net.contains(&ip))
    }

    fn forwarded_client(&self, headers: &HeaderMap) -> Option<IpAddr> {
        let xff = headers.get("x-forwarded-for")?.to_str().ok()?;
        let chain: Vec<IpAddr> = xff
            .split(',')
            .filter_map(|s| s.trim().parse::<IpAddr>().ok())
            .collect();

        if chain.is_empty() {
            return None;
        }

        if let Some(hops) = self.num_trusted {
            return if chain.len() > hops {
                Some(chain[chain.len() - hops - 1])
            } else {
                chain.first().copied()
            };
        }

        if !self.trusted.is_empty() {
            return chain
                .iter()
                .rev()
                .find(|ip| !self.is_trusted(**ip))
                .or_else(|| chain.first())
                .copied();
        }

        chain.last().copied()
    }
}

fn parse_net(value: &str) -> Option<IpNet> {
    let value = value.trim();
    value
        .parse::<IpNet>()
        .ok()
        .or_else(|| {
            let addr = value.parse::<IpAddr>().ok()?;
            let prefix = if addr.is_ipv4() { 32 } else { 128 };
            IpNet::new(addr, prefix).ok()
        })
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Truncate to /24 for IPv4 and /48 for IPv6
pub fn anonymize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(addr) => {
            let [a, b, c, _] = addr.octets();
            IpAddr::V4(Ipv4Addr::new(a, b, c, 0))
        }
        IpAddr::V6(addr) => {
            let s = addr.segments();
            IpAddr::V6(Ipv6Addr::new(s[0], s[1], s[2], 0, 0, 0, 0, 0))
        }
    }
}
