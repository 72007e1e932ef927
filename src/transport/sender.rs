//! Multicast sender
//!
//! Owns the outbound UDP socket for a fixed multicast endpoint and sends
//! one datagram per call. Fire-and-forget: a failed send is surfaced to
//! the caller, never retried.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

use super::{Endpoint, McastConfig, TransportError, TransportResult};

/// Sends frames to a multicast group.
///
/// Construction only stores configuration; the OS socket is created by
/// `open`, which `send` calls on first use and which is idempotent
/// afterwards. The socket stays open until the sender is dropped.
pub struct MulticastSender {
    endpoint: Endpoint,
    config: McastConfig,
    socket: Option<UdpSocket>,
}

impl MulticastSender {
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

    /// Create the outbound socket. Must run inside a tokio runtime.
    pub fn open(&mut self) -> TransportResult<()> {
        if self.socket.is_some() {
            return Ok(());
        }

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_multicast_ttl_v4(self.config.ttl)?;
        socket.set_nonblocking(true)?;

        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        socket.bind(&bind_addr.into())?;

        self.socket = Some(UdpSocket::from_std(socket.into())?);

        tracing::debug!(
            "Opened multicast sender for {} (ttl {})",
            self.endpoint,
            self.config.ttl
        );

        Ok(())
    }

    /// Send one datagram to the group
    pub async fn send(&mut self, frame: &[u8]) -> TransportResult<()> {
        self.open()?;
        let socket = self.socket.as_ref().ok_or(TransportError::NotOpen)?;

        let sent = socket.send_to(frame, self.endpoint.socket_addr()).await?;
        if sent != frame.len() {
            tracing::warn!("Partial send: {} of {} bytes", sent, frame.len());
        }

        Ok(())
    }
}
