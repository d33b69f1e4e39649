use std::fmt;
use std::net::IpAddr;

use crate::error::{CaptureError, Result};

/// A basic `{ip}:{port}` socket address as recorded in a replay log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Addr {
    pub ip: IpAddr,
    pub port: u16,
}

impl Addr {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Parse an `ip:port` token.
    ///
    /// The token is split on the final `:`. IPv6 hosts must be bracketed
    /// (`[::1]:5432`); an unbracketed host containing `:` is ambiguous and
    /// rejected. The host must be a syntactically valid IP literal, the port
    /// an unsigned decimal in `[0, 65535]`.
    pub fn parse(token: &str) -> Result<Addr> {
        let (host, port_str) = token
            .rsplit_once(':')
            .ok_or_else(|| CaptureError::InvalidAddress(format!("missing port in {token:?}")))?;

        let ip = if let Some(inner) = host.strip_prefix('[') {
            let inner = inner.strip_suffix(']').ok_or_else(|| {
                CaptureError::InvalidAddress(format!("unclosed bracket in host {host:?}"))
            })?;
            IpAddr::V6(inner.parse().map_err(|_| {
                CaptureError::InvalidAddress(format!("invalid IPv6 literal {inner:?}"))
            })?)
        } else if host.contains(':') {
            // An IPv6 host with a port must be bracketed; splitting on the
            // final ':' would otherwise eat a hextet.
            return Err(CaptureError::InvalidAddress(format!(
                "IPv6 host must be bracketed: {token:?}"
            )));
        } else {
            IpAddr::V4(host.parse().map_err(|_| {
                CaptureError::InvalidAddress(format!("invalid IPv4 literal {host:?}"))
            })?)
        };

        let port: u16 = port_str
            .parse()
            .map_err(|_| CaptureError::InvalidAddress(format!("invalid port {port_str:?}")))?;

        Ok(Addr { ip, port })
    }
}

impl fmt::Display for Addr {
    /// Canonical `ip:port` text; IPv6 is bracketed so the output parses back.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use super::Addr;

    #[test]
    fn parse_ipv4() {
        let a = Addr::parse("127.0.0.1:64245").unwrap();
        assert_eq!(a.ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(a.port, 64245);
    }

    #[test]
    fn parse_bracketed_ipv6() {
        let a = Addr::parse("[::1]:5432").unwrap();
        assert_eq!(a.ip, IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(a.port, 5432);
    }

    #[test]
    fn display_roundtrip() {
        for token in ["10.1.2.3:5432", "[2001:db8::1]:443"] {
            let a = Addr::parse(token).unwrap();
            assert_eq!(a.to_string(), token);
            assert_eq!(Addr::parse(&a.to_string()).unwrap(), a);
        }
    }

    #[test]
    fn reject_missing_port() {
        let err = Addr::parse("127.0.0.1").unwrap_err();
        assert!(err.to_string().contains("missing port"));
    }

    #[test]
    fn reject_non_ip_host() {
        assert!(Addr::parse("localhost:5432").is_err());
    }

    #[test]
    fn reject_unbracketed_ipv6() {
        let err = Addr::parse("::1:5432").unwrap_err();
        assert!(err.to_string().contains("bracketed"));
    }

    #[test]
    fn reject_bad_port() {
        assert!(Addr::parse("127.0.0.1:65536").is_err());
        assert!(Addr::parse("127.0.0.1:http").is_err());
        assert!(Addr::parse("127.0.0.1:").is_err());
    }
}
