//! Protocol module - Defines the wire format for mcom messages
//!
//! A message on the wire is a single UDP datagram whose payload is a
//! zlib-compressed JSON document. There is no header, no versioning and
//! no checksum beyond what UDP and zlib already provide. A message that
//! does not fit in one datagram after compression cannot be sent.

mod serializer;

pub use serializer::*;

use std::net::Ipv4Addr;

/// Default UDP port for mcom traffic
pub const DEFAULT_PORT: u16 = 23344;

/// Default multicast group
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(234, 56, 54, 32);

/// Multicast TTL - 1 keeps datagrams on the local network segment
pub const MCAST_TTL: u32 = 1;

/// Maximum size of a packed frame (1 KiB, one datagram)
pub const MESSAGE_SIZE_LIMIT: usize = 1024;
