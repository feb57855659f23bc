//! Packet descriptors and the layered codec pipeline
//!
//! - [`parser`]: walks a received frame layer by layer
//! - [`builder`]: encodes outbound packets from the innermost layer outwards
//! - [`cursor`]: bounded views handed between layers

pub mod builder;
pub mod cursor;
pub mod parser;

use std::fmt;
use std::net::IpAddr;
use std::ops::Range;

use bytes::Bytes;

use crate::error::SanityError;
use crate::link::{ArpHeader, EtherHeader};
use crate::network::{IcmpHeader, Ipv4Header, Ipv6Header, PseudoHeader};
use crate::tracker::Tracker;
use crate::transport::{TcpHeader, UdpHeader};

pub use builder::PacketBuilder;
pub use cursor::Cursor;
pub use parser::PacketParser;

/// Decode capability shared by every header codec
pub trait Codec: Sized {
    /// Length of the fixed part of the header
    const HEADER_LEN: usize;

    /// Decode and sanity-check the header at the cursor.
    ///
    /// `pseudo` is the pseudo-header of the enclosing IP packet, present for
    /// layers carried inside IPv4/IPv6.
    fn decode(cursor: &Cursor<'_>, pseudo: Option<&PseudoHeader>) -> Result<Self, SanityError>;

    /// Encoded length of this header including options
    fn header_len(&self) -> usize {
        Self::HEADER_LEN
    }
}

/// Protocol layers the stack knows how to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Ether,
    Arp,
    Ipv4,
    Ipv6,
    Icmp4,
    Icmp6,
    Udp,
    Tcp,
}

impl Layer {
    /// Layers after which decoding always stops
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Layer::Arp | Layer::Icmp4 | Layer::Icmp6 | Layer::Udp | Layer::Tcp
        )
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Ether => "ETHER",
            Layer::Arp => "ARP",
            Layer::Ipv4 => "IPv4",
            Layer::Ipv6 => "IPv6",
            Layer::Icmp4 => "ICMPv4",
            Layer::Icmp6 => "ICMPv6",
            Layer::Udp => "UDP",
            Layer::Tcp => "TCP",
        };
        f.write_str(name)
    }
}

/// One decoded header of any supported protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Ether(EtherHeader),
    Arp(ArpHeader),
    Ipv4(Ipv4Header),
    Ipv6(Ipv6Header),
    Icmp4(IcmpHeader),
    Icmp6(IcmpHeader),
    Udp(UdpHeader),
    Tcp(TcpHeader),
}

impl Header {
    pub fn layer(&self) -> Layer {
        match self {
            Header::Ether(_) => Layer::Ether,
            Header::Arp(_) => Layer::Arp,
            Header::Ipv4(_) => Layer::Ipv4,
            Header::Ipv6(_) => Layer::Ipv6,
            Header::Icmp4(_) => Layer::Icmp4,
            Header::Icmp6(_) => Layer::Icmp6,
            Header::Udp(_) => Layer::Udp,
            Header::Tcp(_) => Layer::Tcp,
        }
    }

    pub fn header_len(&self) -> usize {
        match self {
            Header::Ether(h) => h.header_len(),
            Header::Arp(h) => h.header_len(),
            Header::Ipv4(h) => h.header_len(),
            Header::Ipv6(h) => h.header_len(),
            Header::Icmp4(h) | Header::Icmp6(h) => h.header_len(),
            Header::Udp(h) => h.header_len(),
            Header::Tcp(h) => h.header_len(),
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Header::Ether(h) => fmt::Display::fmt(h, f),
            Header::Arp(h) => fmt::Display::fmt(h, f),
            Header::Ipv4(h) => fmt::Display::fmt(h, f),
            Header::Ipv6(h) => fmt::Display::fmt(h, f),
            Header::Icmp4(h) | Header::Icmp6(h) => fmt::Display::fmt(h, f),
            Header::Udp(h) => fmt::Display::fmt(h, f),
            Header::Tcp(h) => fmt::Display::fmt(h, f),
        }
    }
}

/// Terminal state of a packet walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Every known layer decoded; `payload` is the absolute range of the bytes
    /// carried by the last decoded layer
    Parsed { last: Layer, payload: Range<usize> },
    /// Decoding stopped at `layer`
    Failed { layer: Layer, reason: SanityError },
}

/// Everything known about one packet, inbound or outbound
#[derive(Debug, Clone)]
pub struct PacketDescriptor {
    frame: Bytes,
    layers: Vec<Header>,
    tracker: Tracker,
    status: Status,
}

impl PacketDescriptor {
    pub(crate) fn new(frame: Bytes, layers: Vec<Header>, tracker: Tracker, status: Status) -> Self {
        PacketDescriptor {
            frame,
            layers,
            tracker,
            status,
        }
    }

    /// The complete frame as received or built
    pub fn frame(&self) -> &Bytes {
        &self.frame
    }

    /// Successfully decoded headers, outermost first
    pub fn layers(&self) -> &[Header] {
        &self.layers
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self.status, Status::Parsed { .. })
    }

    /// Layer and reason of a failed walk
    pub fn failure(&self) -> Option<(Layer, &SanityError)> {
        match &self.status {
            Status::Failed { layer, reason } => Some((*layer, reason)),
            Status::Parsed { .. } => None,
        }
    }

    /// Bytes carried by the innermost decoded layer
    pub fn payload(&self) -> Option<Bytes> {
        match &self.status {
            Status::Parsed { payload, .. } => Some(self.frame.slice(payload.clone())),
            Status::Failed { .. } => None,
        }
    }

    pub fn ether(&self) -> Option<&EtherHeader> {
        self.layers.iter().find_map(|h| match h {
            Header::Ether(h) => Some(h),
            _ => None,
        })
    }

    pub fn arp(&self) -> Option<&ArpHeader> {
        self.layers.iter().find_map(|h| match h {
            Header::Arp(h) => Some(h),
            _ => None,
        })
    }

    pub fn ipv4(&self) -> Option<&Ipv4Header> {
        self.layers.iter().find_map(|h| match h {
            Header::Ipv4(h) => Some(h),
            _ => None,
        })
    }

    pub fn ipv6(&self) -> Option<&Ipv6Header> {
        self.layers.iter().find_map(|h| match h {
            Header::Ipv6(h) => Some(h),
            _ => None,
        })
    }

    /// ICMPv4 or ICMPv6 header
    pub fn icmp(&self) -> Option<&IcmpHeader> {
        self.layers.iter().find_map(|h| match h {
            Header::Icmp4(h) | Header::Icmp6(h) => Some(h),
            _ => None,
        })
    }

    pub fn udp(&self) -> Option<&UdpHeader> {
        self.layers.iter().find_map(|h| match h {
            Header::Udp(h) => Some(h),
            _ => None,
        })
    }

    pub fn tcp(&self) -> Option<&TcpHeader> {
        self.layers.iter().find_map(|h| match h {
            Header::Tcp(h) => Some(h),
            _ => None,
        })
    }

    /// (source, destination) of the IP layer, if any
    pub fn ip_addrs(&self) -> Option<(IpAddr, IpAddr)> {
        if let Some(ip) = self.ipv4() {
            return Some((IpAddr::V4(ip.src_addr), IpAddr::V4(ip.dst_addr)));
        }
        self.ipv6()
            .map(|ip| (IpAddr::V6(ip.src_addr), IpAddr::V6(ip.dst_addr)))
    }
}

impl fmt::Display for PacketDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tracker)?;
        for header in &self.layers {
            write!(f, " | {}", header)?;
        }
        if let Status::Failed { layer, reason } = &self.status {
            write!(f, " | {} failed: {}", layer, reason)?;
        }
        Ok(())
    }
}
