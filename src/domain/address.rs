//! Resolved client addresses.

use std::fmt;
use std::net::IpAddr;

/// A client address after resolution: the IP plus the name it is known by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedAddress {
    ip: IpAddr,
    hostname: String,
}

impl ResolvedAddress {
    /// Create a resolved address. An empty host name falls back to the IP.
    pub fn new(ip: IpAddr, hostname: impl Into<String>) -> Self {
        let hostname = hostname.into();
        let hostname = if hostname.trim().is_empty() {
            ip.to_string()
        } else {
            hostname
        };
        Self { ip, hostname }
    }

    /// An address known only by its IP.
    pub fn from_ip(ip: IpAddr) -> Self {
        Self {
            ip,
            hostname: ip.to_string(),
        }
    }

    /// Key used to track the client; the textual IP.
    pub fn id(&self) -> String {
        self.ip.to_string()
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Host name as provided or resolved, the IP when unknown.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn is_loopback(&self) -> bool {
        self.ip.is_loopback()
    }

    /// Loopback, private, link-local or unique-local addresses.
    pub fn is_local_network(&self) -> bool {
        match self.ip {
            IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
            IpAddr::V6(v6) => {
                let first = v6.segments()[0];
                v6.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
            }
        }
    }

    /// Short description used in logs and audit records.
    pub fn to_description(&self) -> String {
        if self.hostname == self.ip.to_string() {
            self.hostname.clone()
        } else {
            format!("{} ({})", self.hostname, self.ip)
        }
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_description())
    }
}

/// Geographic enrichment for a client, supplied by the persistence gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

impl GeoLocation {
    pub fn description(&self) -> String {
        [&self.city, &self.region, &self.country]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
