//! ICMP (Internet Control Message Protocol) implementation
//!
//! This module provides ICMP message parsing and construction for both
//! ICMPv4 (RFC 792) and ICMPv6 (RFC 4443). The two share the 8-byte layout
//! used by echo messages; they differ in type numbers and in the ICMPv6
//! checksum covering an IPv6 pseudo-header.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

use super::{checksum, verify, PseudoHeader};
use crate::error::{SanityError, StackError};
use crate::packet::{Codec, Cursor};

/// Minimum ICMP header length in bytes
pub const ICMP_HEADER_LEN: usize = 8;

/// ICMPv4 message types
pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;
pub const ICMP_TYPE_DEST_UNREACHABLE: u8 = 3;
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;

/// ICMPv6 message types
pub const ICMP6_TYPE_DEST_UNREACHABLE: u8 = 1;
pub const ICMP6_TYPE_ECHO_REQUEST: u8 = 128;
pub const ICMP6_TYPE_ECHO_REPLY: u8 = 129;

/// ICMP message
///
/// `message_id` and `message_seq` are the two halves of the 4-byte
/// type-specific field; for echo messages they are identifier and sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub message_id: u16,
    pub message_seq: u16,
    pub message_data: Bytes,
}

impl IcmpHeader {
    /// Echo request or reply carrying `data`
    pub fn echo(icmp_type: u8, message_id: u16, message_seq: u16, data: Bytes) -> Self {
        IcmpHeader {
            icmp_type,
            code: 0,
            checksum: 0,
            message_id,
            message_seq,
            message_data: data,
        }
    }

    /// Serialize the message exactly as its fields stand
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; ICMP_HEADER_LEN];
        bytes[0] = self.icmp_type;
        bytes[1] = self.code;
        BigEndian::write_u16(&mut bytes[2..4], self.checksum);
        BigEndian::write_u16(&mut bytes[4..6], self.message_id);
        BigEndian::write_u16(&mut bytes[6..8], self.message_seq);
        bytes.extend_from_slice(&self.message_data);
        bytes
    }

    /// Encode the message with a freshly computed checksum
    ///
    /// ICMPv6 messages need the IPv6 pseudo-header; ICMPv4 passes `None`.
    pub fn encode(&self, pseudo: Option<&PseudoHeader>) -> Result<Vec<u8>, StackError> {
        let mut bytes = IcmpHeader {
            checksum: 0,
            ..self.clone()
        }
        .to_bytes();

        let sum = match pseudo {
            Some(pseudo @ PseudoHeader::V6 { .. }) => pseudo.with_length(bytes.len())?.checksum(&bytes),
            _ => {
                if bytes.len() > u16::MAX as usize {
                    return Err(StackError::FieldOverflow {
                        field: "ICMP message length",
                        value: bytes.len(),
                        max: u16::MAX as usize,
                    });
                }
                checksum(&bytes)
            }
        };
        BigEndian::write_u16(&mut bytes[2..4], sum);
        Ok(bytes)
    }
}

impl Codec for IcmpHeader {
    const HEADER_LEN: usize = ICMP_HEADER_LEN;

    fn decode(cursor: &Cursor<'_>, pseudo: Option<&PseudoHeader>) -> Result<Self, SanityError> {
        let data = cursor.header(ICMP_HEADER_LEN)?;
        let message = cursor.bytes();

        match pseudo {
            Some(pseudo @ PseudoHeader::V6 { .. }) => pseudo.verify(message, 2)?,
            _ => verify(&[], message, 2)?,
        }

        Ok(IcmpHeader {
            icmp_type: data[0],
            code: data[1],
            checksum: BigEndian::read_u16(&data[2..4]),
            message_id: BigEndian::read_u16(&data[4..6]),
            message_seq: BigEndian::read_u16(&data[6..8]),
            message_data: cursor.slice(ICMP_HEADER_LEN..message.len()),
        })
    }
}

impl fmt::Display for IcmpHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.icmp_type {
            ICMP_TYPE_ECHO_REQUEST | ICMP6_TYPE_ECHO_REQUEST => "echo request",
            ICMP_TYPE_ECHO_REPLY | ICMP6_TYPE_ECHO_REPLY => "echo reply",
            ICMP_TYPE_DEST_UNREACHABLE | ICMP6_TYPE_DEST_UNREACHABLE => {
                return write!(
                    f,
                    "ICMP destination unreachable, code {}, dlen {}",
                    self.code,
                    self.message_data.len()
                )
            }
            _ => {
                return write!(
                    f,
                    "ICMP type {}, code {}, dlen {}",
                    self.icmp_type,
                    self.code,
                    self.message_data.len()
                )
            }
        };
        write!(
            f,
            "ICMP {}, id {}, seq {}, dlen {}",
            kind,
            self.message_id,
            self.message_seq,
            self.message_data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol;

    fn request() -> IcmpHeader {
        IcmpHeader::echo(ICMP_TYPE_ECHO_REQUEST, 0x1234, 7, Bytes::from_static(b"abcdefgh"))
    }

    #[test]
    fn test_encode_v4_checksum() {
        let bytes = request().encode(None).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[4..8], &[0x12, 0x34, 0x00, 0x07]);
        assert_eq!(checksum(&bytes), 0);
    }

    #[test]
    fn test_decode_round_trip() {
        let buf = Bytes::from(request().encode(None).unwrap());
        let decoded = IcmpHeader::decode(&Cursor::new(&buf), None).unwrap();
        assert_eq!(decoded.message_id, 0x1234);
        assert_eq!(decoded.message_seq, 7);
        assert_eq!(&decoded.message_data[..], b"abcdefgh");
        assert_eq!(decoded.encode(None).unwrap(), &buf[..]);
    }

    #[test]
    fn test_v6_checksum_uses_pseudo_header() {
        let pseudo = PseudoHeader::new(
            "fe80::1".parse().unwrap(),
            "fe80::2".parse().unwrap(),
            protocol::ICMPV6,
            0,
        )
        .unwrap();
        let msg = IcmpHeader::echo(ICMP6_TYPE_ECHO_REQUEST, 1, 1, Bytes::from_static(b"ping"));
        let buf = Bytes::from(msg.encode(Some(&pseudo)).unwrap());

        let pseudo = pseudo.with_length(buf.len()).unwrap();
        assert!(IcmpHeader::decode(&Cursor::new(&buf), Some(&pseudo)).is_ok());
        // Without the pseudo-header the same bytes do not verify
        assert!(matches!(
            IcmpHeader::decode(&Cursor::new(&buf), None),
            Err(SanityError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let mut bytes = request().encode(None).unwrap();
        bytes[10] ^= 0x01;
        let buf = Bytes::from(bytes);
        assert!(matches!(
            IcmpHeader::decode(&Cursor::new(&buf), None),
            Err(SanityError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated() {
        let buf = Bytes::from_static(&[8, 0, 0, 0, 0]);
        assert!(matches!(
            IcmpHeader::decode(&Cursor::new(&buf), None),
            Err(SanityError::Truncated { needed: 8, available: 5 })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(request().to_string(), "ICMP echo request, id 4660, seq 7, dlen 8");
    }

    #[test]
    fn test_display_unreachable() {
        let mut msg = request();
        msg.icmp_type = ICMP_TYPE_DEST_UNREACHABLE;
        msg.code = 3;
        assert_eq!(msg.to_string(), "ICMP destination unreachable, code 3, dlen 8");

        msg.icmp_type = ICMP6_TYPE_DEST_UNREACHABLE;
        msg.code = 4;
        assert_eq!(msg.to_string(), "ICMP destination unreachable, code 4, dlen 8");

        msg.icmp_type = 11;
        assert_eq!(msg.to_string(), "ICMP type 11, code 4, dlen 8");
    }
}
