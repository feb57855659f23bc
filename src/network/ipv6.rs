//! IPv6 protocol implementation
//!
//! Fixed 40-byte header (RFC 8200). Extension headers are not interpreted:
//! a next-header value the stack does not know ends the walk.

use std::fmt;
use std::net::{IpAddr, Ipv6Addr};

use byteorder::{BigEndian, ByteOrder};

use super::PseudoHeader;
use crate::error::{SanityError, StackError};
use crate::packet::{Codec, Cursor};

pub const IPV6_HEADER_LEN: usize = 40;
const IPV6_VERSION: u8 = 6;
const DEFAULT_HOP_LIMIT: u8 = 64;

/// IPv6 packet header structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Header {
    pub version: u8,
    pub traffic_class: u8,
    pub flow_label: u32, // 20 bits
    pub payload_length: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub src_addr: Ipv6Addr,
    pub dst_addr: Ipv6Addr,
}

impl Ipv6Header {
    pub fn new(next_header: u8, src_addr: Ipv6Addr, dst_addr: Ipv6Addr) -> Self {
        Ipv6Header {
            version: IPV6_VERSION,
            traffic_class: 0,
            flow_label: 0,
            payload_length: 0,
            next_header,
            hop_limit: DEFAULT_HOP_LIMIT,
            src_addr,
            dst_addr,
        }
    }

    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    /// Pseudo-header for the upper-layer message this packet carries
    pub fn pseudo_header(&self) -> PseudoHeader {
        PseudoHeader::V6 {
            src: self.src_addr,
            dst: self.dst_addr,
            next_header: self.next_header,
            length: self.payload_length as u32,
        }
    }

    /// Serialize the header exactly as its fields stand
    pub fn to_bytes(&self) -> [u8; IPV6_HEADER_LEN] {
        let mut bytes = [0u8; IPV6_HEADER_LEN];
        let word = ((self.version as u32) << 28)
            | ((self.traffic_class as u32) << 20)
            | (self.flow_label & 0x000F_FFFF);
        BigEndian::write_u32(&mut bytes[0..4], word);
        BigEndian::write_u16(&mut bytes[4..6], self.payload_length);
        bytes[6] = self.next_header;
        bytes[7] = self.hop_limit;
        bytes[8..24].copy_from_slice(&self.src_addr.octets());
        bytes[24..40].copy_from_slice(&self.dst_addr.octets());
        bytes
    }

    /// Encode the header for a payload of `payload_len` bytes
    pub fn encode(&self, payload_len: usize) -> Result<[u8; IPV6_HEADER_LEN], StackError> {
        let payload_length = u16::try_from(payload_len).map_err(|_| StackError::FieldOverflow {
            field: "IPv6 payload length",
            value: payload_len,
            max: u16::MAX as usize,
        })?;
        if self.flow_label > 0x000F_FFFF {
            return Err(StackError::FieldOverflow {
                field: "IPv6 flow label",
                value: self.flow_label as usize,
                max: 0x000F_FFFF,
            });
        }
        let header = Ipv6Header {
            version: IPV6_VERSION,
            payload_length,
            ..*self
        };
        Ok(header.to_bytes())
    }

    pub fn src(&self) -> IpAddr {
        IpAddr::V6(self.src_addr)
    }

    pub fn dst(&self) -> IpAddr {
        IpAddr::V6(self.dst_addr)
    }
}

impl Codec for Ipv6Header {
    const HEADER_LEN: usize = IPV6_HEADER_LEN;

    fn decode(cursor: &Cursor<'_>, _pseudo: Option<&PseudoHeader>) -> Result<Self, SanityError> {
        let data = cursor.header(IPV6_HEADER_LEN)?;

        let word = BigEndian::read_u32(&data[0..4]);
        let version = (word >> 28) as u8;
        if version != IPV6_VERSION {
            return Err(SanityError::structural(format!(
                "IP version {} in IPv6 header",
                version
            )));
        }

        let payload_length = BigEndian::read_u16(&data[4..6]);
        let total = IPV6_HEADER_LEN + payload_length as usize;
        if total > cursor.remaining() {
            return Err(SanityError::Truncated {
                needed: total,
                available: cursor.remaining(),
            });
        }

        Ok(Ipv6Header {
            version,
            traffic_class: ((word >> 20) & 0xFF) as u8,
            flow_label: word & 0x000F_FFFF,
            payload_length,
            next_header: data[6],
            hop_limit: data[7],
            src_addr: Ipv6Addr::from(BigEndian::read_u128(&data[8..24])),
            dst_addr: Ipv6Addr::from(BigEndian::read_u128(&data[24..40])),
        })
    }
}

impl fmt::Display for Ipv6Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv6 {} > {}, next {} ({}), hop {}, dlen {}",
            self.src_addr,
            self.dst_addr,
            self.next_header,
            super::protocol::name(self.next_header),
            self.hop_limit,
            self.payload_length
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol;
    use bytes::Bytes;

    fn header() -> Ipv6Header {
        let mut h = Ipv6Header::new(
            protocol::UDP,
            "fe80::1".parse().unwrap(),
            "fe80::2".parse().unwrap(),
        );
        h.traffic_class = 0xb8;
        h.flow_label = 0x12345;
        h
    }

    #[test]
    fn test_encode_layout() {
        let bytes = header().encode(8).unwrap();
        assert_eq!(&bytes[0..4], &[0x6b, 0x81, 0x23, 0x45]);
        assert_eq!(&bytes[4..8], &[0x00, 0x08, 17, 64]);
        assert_eq!(bytes[8], 0xfe);
        assert_eq!(bytes[39], 0x02);
    }

    #[test]
    fn test_decode_round_trip() {
        let mut frame = header().encode(3).unwrap().to_vec();
        frame.extend_from_slice(&[9, 9, 9]);
        let buf = Bytes::from(frame);
        let decoded = Ipv6Header::decode(&Cursor::new(&buf), None).unwrap();
        let mut expected = header();
        expected.payload_length = 3;
        assert_eq!(decoded, expected);
        assert_eq!(decoded.encode(3).unwrap(), decoded.to_bytes());
    }

    #[test]
    fn test_decode_rejects_payload_past_buffer() {
        let buf = Bytes::copy_from_slice(&header().encode(8).unwrap());
        assert!(matches!(
            Ipv6Header::decode(&Cursor::new(&buf), None),
            Err(SanityError::Truncated { needed: 48, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_version() {
        let mut frame = header().encode(0).unwrap();
        frame[0] = 0x45;
        let buf = Bytes::copy_from_slice(&frame);
        assert!(matches!(
            Ipv6Header::decode(&Cursor::new(&buf), None),
            Err(SanityError::Structural(_))
        ));
    }

    #[test]
    fn test_flow_label_overflow() {
        let mut h = header();
        h.flow_label = 0x100000;
        assert!(matches!(h.encode(0), Err(StackError::FieldOverflow { .. })));
    }
}
