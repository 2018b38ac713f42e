//! Network-level filter for webhook deliveries.
//!
//! Addresses are compared against parsed CIDR networks, so `173.25.0.0/16`
//! never admits `173.252.1.5` the way a textual prefix check would.

use ipnetwork::IpNetwork;
use std::{net::IpAddr, str::FromStr};

#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    allowed: Vec<IpNetwork>,
    trusted_proxies: Vec<IpNetwork>,
}

fn parse_cidrs(csv: Option<&str>) -> anyhow::Result<Vec<IpNetwork>> {
    csv.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            IpNetwork::from_str(entry).map_err(|e| anyhow::anyhow!("invalid CIDR `{entry}`: {e}"))
        })
        .collect()
}

impl SourceFilter {
    pub fn parse(allowed: Option<&str>, trusted_proxies: Option<&str>) -> anyhow::Result<Self> {
        Ok(Self {
            allowed: parse_cidrs(allowed)?,
            trusted_proxies: parse_cidrs(trusted_proxies)?,
        })
    }

    pub fn is_enabled(&self) -> bool {
        !self.allowed.is_empty()
    }

    fn is_trusted_proxy(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.iter().any(|cidr| cidr.contains(ip))
    }

    /// Resolves the originating address of a request.
    ///
    /// `X-Forwarded-For` is only honoured when the direct peer is a trusted
    /// proxy. Each proxy appends the address it received the request from, so
    /// the header is walked from the right and the first hop outside the
    /// trusted proxies is the client. Hops left of it are client supplied and
    /// ignored. Falls back to the peer when every hop is a trusted proxy or a
    /// hop is not an address.
    pub fn client_ip(&self, peer: Option<IpAddr>, forwarded_for: Option<&str>) -> Option<IpAddr> {
        let peer = peer?;
        if !self.is_trusted_proxy(peer) {
            return Some(peer);
        }

        let client = forwarded_for
            .unwrap_or_default()
            .rsplit(',')
            .map_while(|hop| hop.trim().parse::<IpAddr>().ok())
            .find(|ip| !self.is_trusted_proxy(*ip));

        Some(client.unwrap_or(peer))
    }

    /// Whether a delivery from `client_ip` may be accepted.
    ///
    /// Always true when no source networks are configured. An unknown address
    /// is refused once filtering is enabled.
    pub fn permits(&self, client_ip: Option<IpAddr>) -> bool {
        if !self.is_enabled() {
            return true;
        }

        client_ip.is_some_and(|ip| self.allowed.iter().any(|cidr| cidr.contains(ip)))
    }
}
