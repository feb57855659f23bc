//! IPv4 protocol implementation
//!
//! This module provides IPv4 header parsing, validation, and serialization.
//!
//! Features:
//! - IPv4 header parsing with sanity and checksum validation
//! - Header creation with automatic length and checksum
//! - Pseudo-header derivation for transport checksums

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

use super::{checksum, verify, PseudoHeader};
use crate::error::{SanityError, StackError};
use crate::packet::{Codec, Cursor};

pub const IPV4_HEADER_LEN: usize = 20;
const IPV4_MAX_HEADER_LEN: usize = 60;
const IPV4_VERSION: u8 = 4;
const DEFAULT_IHL: u8 = 5; // 5 * 4 = 20 bytes (standard header length)
const DEFAULT_TTL: u8 = 64;

/// IPv4 packet header structure
///
/// Represents the IPv4 header as defined in RFC 791, options included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8, // Internet Header Length
    pub tos: u8, // Type of Service
    pub total_len: u16,
    pub id: u16,
    pub flags_frag_offset: u16, // Flags and Fragment Offset
    pub ttl: u8,                // Time to Live
    pub protocol: u8,           // Next Protocol
    pub checksum: u16,
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub options: Bytes,
}

impl Ipv4Header {
    /// Create a new IPv4 header with default values
    ///
    /// Length and checksum fields are filled in by [`Ipv4Header::encode`].
    pub fn new(protocol: u8, src_addr: Ipv4Addr, dst_addr: Ipv4Addr) -> Self {
        Ipv4Header {
            version: IPV4_VERSION,
            ihl: DEFAULT_IHL,
            tos: 0,
            total_len: IPV4_HEADER_LEN as u16,
            id: 0,
            flags_frag_offset: flags::DONT_FRAGMENT,
            ttl: DEFAULT_TTL,
            protocol,
            checksum: 0,
            src_addr,
            dst_addr,
            options: Bytes::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    /// Get the header length in bytes
    pub fn header_len(&self) -> usize {
        (self.ihl as usize) * 4
    }

    /// Get payload length
    ///
    /// Returns the length of the payload (total length - header length)
    pub fn payload_len(&self) -> usize {
        (self.total_len as usize).saturating_sub(self.header_len())
    }

    /// Pseudo-header for the transport message this packet carries
    pub fn pseudo_header(&self) -> PseudoHeader {
        PseudoHeader::V4 {
            src: self.src_addr,
            dst: self.dst_addr,
            protocol: self.protocol,
            length: self.payload_len() as u16,
        }
    }

    /// Serialize the header exactly as its fields stand
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; IPV4_HEADER_LEN];
        bytes[0] = (self.version << 4) | (self.ihl & 0x0F);
        bytes[1] = self.tos;
        BigEndian::write_u16(&mut bytes[2..4], self.total_len);
        BigEndian::write_u16(&mut bytes[4..6], self.id);
        BigEndian::write_u16(&mut bytes[6..8], self.flags_frag_offset);
        bytes[8] = self.ttl;
        bytes[9] = self.protocol;
        BigEndian::write_u16(&mut bytes[10..12], self.checksum);
        bytes[12..16].copy_from_slice(&self.src_addr.octets());
        bytes[16..20].copy_from_slice(&self.dst_addr.octets());
        bytes.extend_from_slice(&self.options);
        bytes
    }

    /// Encode the header for a payload of `payload_len` bytes
    ///
    /// IHL, total length and checksum are recomputed; whatever the caller left
    /// in those fields is ignored.
    pub fn encode(&self, payload_len: usize) -> Result<Vec<u8>, StackError> {
        if self.options.len() % 4 != 0 {
            return Err(StackError::invalid_header(format!(
                "IPv4 options length {} is not a multiple of 4",
                self.options.len()
            )));
        }
        let header_len = IPV4_HEADER_LEN + self.options.len();
        if header_len > IPV4_MAX_HEADER_LEN {
            return Err(StackError::FieldOverflow {
                field: "IPv4 header length",
                value: header_len,
                max: IPV4_MAX_HEADER_LEN,
            });
        }
        let total_len = header_len + payload_len;
        if total_len > u16::MAX as usize {
            return Err(StackError::FieldOverflow {
                field: "IPv4 total length",
                value: total_len,
                max: u16::MAX as usize,
            });
        }

        let mut header = self.clone();
        header.version = IPV4_VERSION;
        header.ihl = (header_len / 4) as u8;
        header.total_len = total_len as u16;
        header.checksum = 0;

        let mut bytes = header.to_bytes();
        let sum = checksum(&bytes);
        BigEndian::write_u16(&mut bytes[10..12], sum);
        Ok(bytes)
    }

    pub fn is_fragment(&self) -> bool {
        self.flags_frag_offset & (flags::MORE_FRAGMENTS | flags::FRAGMENT_OFFSET_MASK) != 0
    }

    pub fn src(&self) -> IpAddr {
        IpAddr::V4(self.src_addr)
    }

    pub fn dst(&self) -> IpAddr {
        IpAddr::V4(self.dst_addr)
    }
}

impl Codec for Ipv4Header {
    const HEADER_LEN: usize = IPV4_HEADER_LEN;

    fn decode(cursor: &Cursor<'_>, _pseudo: Option<&PseudoHeader>) -> Result<Self, SanityError> {
        let data = cursor.header(IPV4_HEADER_LEN)?;

        let version = (data[0] & 0xF0) >> 4;
        if version != IPV4_VERSION {
            return Err(SanityError::structural(format!(
                "IP version {} in IPv4 header",
                version
            )));
        }

        // Check IHL (minimum 5 for 20-byte header)
        let ihl = data[0] & 0x0F;
        if ihl < DEFAULT_IHL {
            return Err(SanityError::structural(format!("IPv4 IHL {} below 5", ihl)));
        }
        let header_len = ihl as usize * 4;
        let data = cursor.header(header_len)?;

        // Check total length against the header and the buffer
        let total_len = BigEndian::read_u16(&data[2..4]);
        if (total_len as usize) < header_len {
            return Err(SanityError::structural(format!(
                "IPv4 total length {} shorter than header length {}",
                total_len, header_len
            )));
        }
        if total_len as usize > cursor.remaining() {
            return Err(SanityError::Truncated {
                needed: total_len as usize,
                available: cursor.remaining(),
            });
        }

        // Check TTL
        if data[8] == 0 {
            return Err(SanityError::structural("IPv4 TTL is zero"));
        }

        verify(&[], data, 10)?;

        Ok(Ipv4Header {
            version,
            ihl,
            tos: data[1],
            total_len,
            id: BigEndian::read_u16(&data[4..6]),
            flags_frag_offset: BigEndian::read_u16(&data[6..8]),
            ttl: data[8],
            protocol: data[9],
            checksum: BigEndian::read_u16(&data[10..12]),
            src_addr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            dst_addr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            options: cursor.slice(IPV4_HEADER_LEN..header_len),
        })
    }

    fn header_len(&self) -> usize {
        Ipv4Header::header_len(self)
    }
}

impl fmt::Display for Ipv4Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv4 {} > {}, proto {} ({}), id {}, ttl {}, len {}",
            self.src_addr,
            self.dst_addr,
            self.protocol,
            protocol::name(self.protocol),
            self.id,
            self.ttl,
            self.total_len
        )
    }
}

/// IPv4 protocol constants
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const ICMPV6: u8 = 58;

    pub fn name(value: u8) -> &'static str {
        match value {
            ICMP => "ICMPv4",
            TCP => "TCP",
            UDP => "UDP",
            ICMPV6 => "ICMPv6",
            _ => "???",
        }
    }
}

/// IPv4 flags constants
pub mod flags {
    pub const DONT_FRAGMENT: u16 = 0x4000;
    pub const MORE_FRAGMENTS: u16 = 0x2000;
    pub const FRAGMENT_OFFSET_MASK: u16 = 0x1FFF;
}
