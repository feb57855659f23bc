//! A user-space TCP/IP stack implementation in Rust
//!
//! This library provides:
//! - Ethernet, ARP, IPv4, IPv6, ICMP, UDP and TCP header codecs
//! - A layered packet parser producing validated packet descriptors
//! - A packet builder producing checksummed frames
//! - A socket registry that demultiplexes payloads to blocking sockets
//! - A network interface tying the above to a link device

pub mod config;
pub mod error;
pub mod iface;
pub mod link;
pub mod network;
pub mod packet;
pub mod socket;
pub mod tracker;
pub mod transport;

// Re-export commonly used types
pub use config::StackConfig;
pub use error::{Result, SanityError, StackError};
pub use iface::{Device, Loopback, NeighborTable, NetworkInterface};
pub use link::{ArpHeader, EtherHeader, MacAddr};
pub use network::{IcmpHeader, Ipv4Header, Ipv6Header, PseudoHeader};
pub use packet::{Header, Layer, PacketBuilder, PacketDescriptor, PacketParser, Status};
pub use socket::{Endpoint, Message, SocketHandle, SocketId, SocketRegistry, TransportProtocol};
pub use tracker::Tracker;
pub use transport::{TcpHeader, UdpHeader};
