//! Sockets and the demultiplexer
//!
//! A socket is named by its [`SocketId`]: protocol plus local and remote
//! endpoints. A remote endpoint of "any address, port 0" marks a listening
//! socket. Inbound datagrams are matched against registered identities by
//! [`SocketRegistry::dispatch`]; first contact on a listening socket creates
//! a concrete socket for that peer which the application picks up with
//! [`SocketHandle::accept`].

pub mod registry;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;

use crate::network::protocol;
use crate::tracker::Tracker;

pub use registry::{SocketHandle, SocketRegistry};

/// Transport protocols a socket can be opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Udp,
    Tcp,
}

impl TransportProtocol {
    /// IP protocol number
    pub fn number(self) -> u8 {
        match self {
            TransportProtocol::Udp => protocol::UDP,
            TransportProtocol::Tcp => protocol::TCP,
        }
    }

    pub fn from_number(value: u8) -> Option<Self> {
        match value {
            protocol::UDP => Some(TransportProtocol::Udp),
            protocol::TCP => Some(TransportProtocol::Tcp),
            _ => None,
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportProtocol::Udp => f.write_str("UDP"),
            TransportProtocol::Tcp => f.write_str("TCP"),
        }
    }
}

/// Address and port of one end of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Endpoint { addr, port }
    }

    /// "Any address, port 0" in the family of `addr`
    pub fn any_like(addr: &IpAddr) -> Self {
        Endpoint::new(unspecified_like(addr), 0)
    }

    /// Unspecified address and port 0
    pub fn is_wildcard(&self) -> bool {
        self.addr.is_unspecified() && self.port == 0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint::new(addr.ip(), addr.port())
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self {
        SocketAddr::new(endpoint.addr, endpoint.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&SocketAddr::from(*self), f)
    }
}

/// `0.0.0.0` or `::` matching the family of `addr`
pub(crate) fn unspecified_like(addr: &IpAddr) -> IpAddr {
    match addr {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

/// Registry key of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId {
    pub protocol: TransportProtocol,
    pub local: Endpoint,
    pub remote: Endpoint,
}

impl SocketId {
    pub fn new(protocol: TransportProtocol, local: Endpoint, remote: Endpoint) -> Self {
        SocketId {
            protocol,
            local,
            remote,
        }
    }

    /// Identity of a socket accepting any peer on `local`
    pub fn listening(protocol: TransportProtocol, local: Endpoint) -> Self {
        Self::new(protocol, local, Endpoint::any_like(&local.addr))
    }

    /// A listening socket has a wildcard remote side
    pub fn is_listening(&self) -> bool {
        self.remote.is_wildcard()
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.protocol, self.local.addr, self.local.port, self.remote.addr, self.remote.port
        )
    }
}

/// One received payload together with the endpoints it travelled between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub local: Endpoint,
    pub remote: Endpoint,
    pub payload: Bytes,
    pub tracker: Tracker,
}

/// Request handed from a socket to the interface for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPacketRequest {
    pub protocol: TransportProtocol,
    /// Source endpoint; an unspecified address lets the interface choose
    pub local: Endpoint,
    pub remote: Endpoint,
    pub payload: Bytes,
    /// Tracker of the datagram this one answers
    pub parent: Option<Tracker>,
}
