//! Transport module - UDP multicast plumbing
//!
//! Provides:
//! - Sender for pushing frames to a multicast group
//! - Listener for joining a group and receiving frames
//! - The Mcom transport tying both to a serializer and handler dispatch

mod listener;
mod mcom;
mod sender;

pub use listener::*;
pub use mcom::*;
pub use sender::*;

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use thiserror::Error;

use crate::protocol::MCAST_TTL;

/// Transport errors - resolution, socket setup, send and receive failures.
/// None of these are retried; the tool surfaces OS errors immediately.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not resolve multicast address: {0}")]
    Resolution(String),

    #[error("IPv6 multicast is not implemented (address resolved to {0})")]
    UnsupportedFamily(IpAddr),

    #[error("Socket not open")]
    NotOpen,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// A multicast group and UDP port. Immutable once constructed; shared by
/// the sender and the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    group: Ipv4Addr,
    port: u16,
}

impl Endpoint {
    pub fn new(group: Ipv4Addr, port: u16) -> Self {
        Self { group, port }
    }

    /// The group address (alias kept for symmetry with `group`)
    pub fn host(&self) -> Ipv4Addr {
        self.group
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn group(&self) -> Ipv4Addr {
        self.group
    }

    /// The group as a sendable socket address
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.group, self.port))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.group, self.port)
    }
}

/// What the watch loop does when a receive or decode error occurs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecvErrorPolicy {
    /// Propagate the error and terminate the loop (default)
    #[default]
    Fatal,
    /// Log the error at warn level and keep receiving
    SkipAndLog,
}

/// Configuration shared by the multicast sender and listener
#[derive(Debug, Clone)]
pub struct McastConfig {
    /// Multicast TTL; 1 confines datagrams to the local network segment
    pub ttl: u32,
    /// Deliver our own datagrams back to this host (required for
    /// single-host testing)
    pub loopback: bool,
    /// Outbound interface override; resolved via the local hostname
    /// when unset
    pub interface: Option<Ipv4Addr>,
    /// Error policy for the receive loop
    pub on_recv_error: RecvErrorPolicy,
}

impl Default for McastConfig {
    fn default() -> Self {
        Self {
            ttl: MCAST_TTL,
            loopback: true,
            interface: None,
            on_recv_error: RecvErrorPolicy::default(),
        }
    }
}

/// Resolve a multicast group address, gating on the address family.
///
/// The first resolved address decides the family: IPv4 is accepted, IPv6
/// fails fast before any socket is created.
pub async fn resolve_group(addr: &str, port: u16) -> TransportResult<Endpoint> {
    use tokio::net::lookup_host;

    let mut addrs = lookup_host((addr, port))
        .await
        .map_err(|e| TransportError::Resolution(format!("{}: {}", addr, e)))?;

    match addrs.next() {
        Some(SocketAddr::V4(v4)) => Ok(Endpoint::new(*v4.ip(), port)),
        Some(SocketAddr::V6(v6)) => Err(TransportError::UnsupportedFamily(IpAddr::V6(*v6.ip()))),
        None => Err(TransportError::Resolution(format!(
            "{}: no addresses found",
            addr
        ))),
    }
}

/// Pick the local outbound interface by resolving the machine's own
/// hostname. Falls back to the wildcard address when the hostname yields
/// no usable IPv4 address, which makes behavior sensitive to local DNS
/// configuration - an inherent caveat of this scheme.
pub(crate) async fn local_interface_addr() -> Ipv4Addr {
    use tokio::net::lookup_host;

    let name = match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::warn!("Could not read local hostname: {}; using 0.0.0.0", e);
            return Ipv4Addr::UNSPECIFIED;
        }
    };

    let resolved = lookup_host((name.as_str(), 0u16)).await;
    match resolved {
        Ok(addrs) => {
            for addr in addrs {
                if let IpAddr::V4(v4) = addr.ip() {
                    return v4;
                }
            }
            tracing::warn!("Hostname {} has no IPv4 address; using 0.0.0.0", name);
            Ipv4Addr::UNSPECIFIED
        }
        Err(e) => {
            tracing::warn!("Could not resolve hostname {}: {}; using 0.0.0.0", name, e);
            Ipv4Addr::UNSPECIFIED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_accessors() {
        let ep = Endpoint::new(Ipv4Addr::new(239, 1, 1, 1), 23344);
        assert_eq!(ep.group(), Ipv4Addr::new(239, 1, 1, 1));
        assert_eq!(ep.host(), ep.group());
        assert_eq!(ep.port(), 23344);
        assert_eq!(ep.to_string(), "239.1.1.1:23344");
    }

    #[tokio::test]
    async fn test_resolve_ipv4_literal() {
        let ep = resolve_group("234.56.54.32", 23344).await.unwrap();
        assert_eq!(ep.group(), Ipv4Addr::new(234, 56, 54, 32));
    }

    #[tokio::test]
    async fn test_resolve_ipv6_is_rejected() {
        let err = resolve_group("::1", 23344).await.unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedFamily(_)));
    }
}
