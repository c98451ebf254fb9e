//! Caller identity extraction.

use std::fmt;
use std::net::SocketAddr;

use crate::error::{Result, TurnstileError};

/// The key a per-identity limiter is stored under.
///
/// For network callers this is the host part of the peer address, so every
/// connection from one host shares a limiter regardless of source port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Use an arbitrary key (an API key, a user id) as the identity.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Extract the host from a transport-level `host:port` peer address.
    ///
    /// Accepts `1.2.3.4:80`, `[::1]:80` and `example.com:80`. Anything else is
    /// an identity error. A malformed address never falls back to a shared
    /// default key.
    pub fn from_peer_addr(addr: &str) -> Result<Self> {
        let addr = addr.trim();
        if let Ok(socket) = addr.parse::<SocketAddr>() {
            return Ok(Self::from(socket));
        }

        let (host, port) = split_host_port(addr)?;
        if port.parse::<u16>().is_err() {
            return Err(invalid(addr, "port is not a number"));
        }
        if host.is_empty() {
            return Err(invalid(addr, "missing host"));
        }

        Ok(Self(host.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SocketAddr> for Identity {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.ip().to_string())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn split_host_port(addr: &str) -> Result<(&str, &str)> {
    if addr.is_empty() {
        return Err(invalid(addr, "empty address"));
    }

    if let Some(rest) = addr.strip_prefix('[') {
        let (host, port) = rest
            .split_once("]:")
            .ok_or_else(|| invalid(addr, "missing port after bracketed host"))?;
        return Ok((host, port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| invalid(addr, "missing port"))?;
    if host.contains(':') {
        return Err(invalid(addr, "too many colons"));
    }
    Ok((host, port))
}

fn invalid(addr: &str, reason: &str) -> TurnstileError {
    TurnstileError::Identity(format!("invalid peer address {:?}: {}", addr, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_peer() {
        let identity = Identity::from_peer_addr("192.0.2.1:1234").unwrap();
        assert_eq!(identity.as_str(), "192.0.2.1");
    }

    #[test]
    fn test_ipv6_peer() {
        let identity = Identity::from_peer_addr("[2001:db8::1]:443").unwrap();
        assert_eq!(identity.as_str(), "2001:db8::1");
    }

    #[test]
    fn test_hostname_peer() {
        let identity = Identity::from_peer_addr("client.internal:8080").unwrap();
        assert_eq!(identity.to_string(), "client.internal");
    }

    #[test]
    fn test_ports_do_not_split_identities() {
        let a = Identity::from_peer_addr("10.0.0.7:5000").unwrap();
        let b = Identity::from_peer_addr("10.0.0.7:5001").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_malformed_peers_are_errors() {
        for addr in ["", "10.0.0.7", "10.0.0.7:http", ":80", "::1:80", "[::1]", "[::1]:x"] {
            let err = Identity::from_peer_addr(addr).unwrap_err();
            assert!(err.is_identity(), "{:?} should fail identity extraction", addr);
        }
    }

    #[test]
    fn test_from_socket_addr() {
        let socket: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(Identity::from(socket), Identity::new("127.0.0.1"));
    }
}
