use crate::Error;

use std::{
    fmt::{Display, Write},
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

/// A host name and a port. Unlike [`std::net::SocketAddr`] the host may be a
/// domain that has not been resolved.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SocketAddr {
    pub hostname: HostName,
    pub port: u16,
}

impl SocketAddr {
    pub fn new(hostname: HostName, port: u16) -> Self {
        Self { hostname, port }
    }

    pub fn from_host(host: &str, port: u16) -> Result<Self, Error> {
        Ok(Self::new(host.parse()?, port))
    }
}

impl Display for SocketAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hostname.to_string_url_style())?;
        f.write_char(':')?;
        f.write_str(&self.port.to_string())
    }
}

impl FromStr for SocketAddr {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(addr) = std::net::SocketAddr::from_str(s) {
            return Ok(addr.into());
        }

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidAddress(s.to_string()))?;
        let port = port
            .parse()
            .map_err(|_| Error::InvalidAddress(s.to_string()))?;
        Self::from_host(host, port)
    }
}

impl From<std::net::SocketAddr> for SocketAddr {
    fn from(value: std::net::SocketAddr) -> Self {
        Self {
            hostname: value.ip().into(),
            port: value.port(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum HostName {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
    Domain(String),
}

impl HostName {
    pub fn to_string_url_style(&self) -> String {
        match self {
            Self::V6(v6) => format!("[{}]", v6),
            _ => self.to_string(),
        }
    }
}

impl Display for HostName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4(v4) => f.write_str(&v4.to_string()),
            Self::V6(v6) => f.write_str(&v6.to_string()),
            Self::Domain(domain) => f.write_str(domain),
        }
    }
}

impl FromStr for HostName {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(s);
        if let Ok(ip) = IpAddr::from_str(s) {
            Ok(ip.into())
        } else {
            let domain = idna::domain_to_ascii_strict(s)
                .map_err(|_| Error::InvalidAddress(s.to_string()))?;
            Ok(Self::Domain(domain))
        }
    }
}

impl From<IpAddr> for HostName {
    fn from(value: IpAddr) -> Self {
        match value {
            IpAddr::V4(v4) => v4.into(),
            IpAddr::V6(v6) => v6.into(),
        }
    }
}

impl From<Ipv4Addr> for HostName {
    fn from(value: Ipv4Addr) -> Self {
        Self::V4(value)
    }
}

impl From<Ipv6Addr> for HostName {
    fn from(value: Ipv6Addr) -> Self {
        match value.to_ipv4_mapped() {
            Some(v4) => Self::V4(v4),
            None => Self::V6(value),
        }
    }
}
