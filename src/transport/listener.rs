//! Multicast listener
//!
//! Joins a multicast group on a UDP port and hands each arriving datagram
//! to the transport. Socket setup follows standard IPv4 multicast
//! practice: bind the wildcard address (never the group address), pick an
//! outbound interface, then join the group on that interface.

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

use super::{local_interface_addr, Endpoint, McastConfig, TransportError, TransportResult};
use crate::protocol::MESSAGE_SIZE_LIMIT;

/// Receives frames from a multicast group.
///
/// Two-phase like the sender: construction stores configuration, `open`
/// performs the socket setup sequence. There is no leave/close path; the
/// membership lasts until the process exits.
pub struct MulticastListener {
    endpoint: Endpoint,
    config: McastConfig,
    socket: Option<UdpSocket>,
}

impl MulticastListener {
    pub fn new(endpoint: Endpoint, config: McastConfig) -> Self {
        Self {
            endpoint,
            config,
            socket: None,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Create the socket and join the group. Idempotent once open.
    pub async fn open(&mut self) -> TransportResult<()> {
        if self.socket.is_some() {
            return Ok(());
        }

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        // Best-effort: lets several listeners share the port
        if let Err(e) = socket.set_reuse_address(true) {
            tracing::warn!("Could not enable address reuse: {}", e);
        }

        socket.set_multicast_ttl_v4(self.config.ttl)?;
        socket.set_multicast_loop_v4(self.config.loopback)?;

        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.endpoint.port()));
        socket.bind(&bind_addr.into())?;

        let iface = match self.config.interface {
            Some(iface) => iface,
            None => local_interface_addr().await,
        };
        socket.set_multicast_if_v4(&iface)?;
        socket.join_multicast_v4(&self.endpoint.group(), &iface)?;

        socket.set_nonblocking(true)?;
        self.socket = Some(UdpSocket::from_std(socket.into())?);

        tracing::info!(
            "Joined multicast group {} (interface {})",
            self.endpoint,
            iface
        );

        Ok(())
    }

    /// Await one datagram, returning the sender address and the payload
    /// (at most one frame's worth of bytes).
    pub async fn recv(&self) -> TransportResult<(SocketAddr, Bytes)> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotOpen)?;

        let mut buf = [0u8; MESSAGE_SIZE_LIMIT];
        let (len, addr) = socket.recv_from(&mut buf).await?;

        tracing::debug!("Received {} bytes from {}", len, addr);
        Ok((addr, Bytes::copy_from_slice(&buf[..len])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recv_before_open_fails() {
        let listener = MulticastListener::new(
            Endpoint::new(Ipv4Addr::new(239, 1, 1, 1), 0),
            McastConfig::default(),
        );
        let err = tokio_test::block_on(listener.recv()).unwrap_err();
        assert!(matches!(err, TransportError::NotOpen));
    }

    #[tokio::test]
    async fn test_open_joins_group() {
        let config = McastConfig {
            // Pin the interface so the test does not depend on how the
            // host resolves its own name
            interface: Some(Ipv4Addr::UNSPECIFIED),
            ..Default::default()
        };
        let mut listener =
            MulticastListener::new(Endpoint::new(Ipv4Addr::new(239, 1, 1, 2), 23399), config);
        listener.open().await.unwrap();
        assert!(listener.is_open());
        listener.open().await.unwrap();
    }
}
