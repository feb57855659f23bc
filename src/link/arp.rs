//! ARP (Address Resolution Protocol) for Ethernet/IPv4
//!
//! 28-byte packet: hw type(2) + proto type(2) + hw len(1) + proto len(1) +
//! operation(2) + sender hw(6) + sender proto(4) + target hw(6) + target proto(4)

use std::fmt;
use std::net::Ipv4Addr;

use byteorder::{BigEndian, ByteOrder};

use super::{ether_type, MacAddr};
use crate::error::SanityError;
use crate::network::PseudoHeader;
use crate::packet::{Codec, Cursor};

pub const ARP_HEADER_LEN: usize = 28;

const HW_TYPE_ETHERNET: u16 = 1;
const HW_LEN_ETHERNET: u8 = 6;
const PROTO_LEN_IPV4: u8 = 4;

/// ARP operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOperation {
    Request,
    Reply,
}

impl ArpOperation {
    pub const REQUEST: u16 = 1;
    pub const REPLY: u16 = 2;

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            Self::REQUEST => Some(ArpOperation::Request),
            Self::REPLY => Some(ArpOperation::Reply),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            ArpOperation::Request => Self::REQUEST,
            ArpOperation::Reply => Self::REPLY,
        }
    }
}

/// ARP packet for the Ethernet/IPv4 combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpHeader {
    pub hw_type: u16,
    pub proto_type: u16,
    pub hw_len: u8,
    pub proto_len: u8,
    pub operation: u16,
    pub sender_hw_addr: MacAddr,
    pub sender_proto_addr: Ipv4Addr,
    pub target_hw_addr: MacAddr,
    pub target_proto_addr: Ipv4Addr,
}

impl ArpHeader {
    fn new(
        operation: ArpOperation,
        sender_hw_addr: MacAddr,
        sender_proto_addr: Ipv4Addr,
        target_hw_addr: MacAddr,
        target_proto_addr: Ipv4Addr,
    ) -> Self {
        ArpHeader {
            hw_type: HW_TYPE_ETHERNET,
            proto_type: ether_type::IPV4,
            hw_len: HW_LEN_ETHERNET,
            proto_len: PROTO_LEN_IPV4,
            operation: operation.to_u16(),
            sender_hw_addr,
            sender_proto_addr,
            target_hw_addr,
            target_proto_addr,
        }
    }

    /// Who-has request for `target`
    pub fn request(sender_hw_addr: MacAddr, sender_proto_addr: Ipv4Addr, target: Ipv4Addr) -> Self {
        Self::new(
            ArpOperation::Request,
            sender_hw_addr,
            sender_proto_addr,
            MacAddr::ZERO,
            target,
        )
    }

    /// Answer to `request` announcing `hw_addr` as the owner of its target address
    pub fn reply_to(request: &ArpHeader, hw_addr: MacAddr) -> Self {
        Self::new(
            ArpOperation::Reply,
            hw_addr,
            request.target_proto_addr,
            request.sender_hw_addr,
            request.sender_proto_addr,
        )
    }

    pub fn op(&self) -> Option<ArpOperation> {
        ArpOperation::from_u16(self.operation)
    }

    /// Convert ARP packet to bytes
    pub fn to_bytes(&self) -> [u8; ARP_HEADER_LEN] {
        let mut bytes = [0u8; ARP_HEADER_LEN];
        BigEndian::write_u16(&mut bytes[0..2], self.hw_type);
        BigEndian::write_u16(&mut bytes[2..4], self.proto_type);
        bytes[4] = self.hw_len;
        bytes[5] = self.proto_len;
        BigEndian::write_u16(&mut bytes[6..8], self.operation);
        bytes[8..14].copy_from_slice(&self.sender_hw_addr.0);
        bytes[14..18].copy_from_slice(&self.sender_proto_addr.octets());
        bytes[18..24].copy_from_slice(&self.target_hw_addr.0);
        bytes[24..28].copy_from_slice(&self.target_proto_addr.octets());
        bytes
    }
}

impl Codec for ArpHeader {
    const HEADER_LEN: usize = ARP_HEADER_LEN;

    fn decode(cursor: &Cursor<'_>, _pseudo: Option<&PseudoHeader>) -> Result<Self, SanityError> {
        let data = cursor.header(ARP_HEADER_LEN)?;

        let header = ArpHeader {
            hw_type: BigEndian::read_u16(&data[0..2]),
            proto_type: BigEndian::read_u16(&data[2..4]),
            hw_len: data[4],
            proto_len: data[5],
            operation: BigEndian::read_u16(&data[6..8]),
            sender_hw_addr: MacAddr::read(&data[8..14]),
            sender_proto_addr: Ipv4Addr::new(data[14], data[15], data[16], data[17]),
            target_hw_addr: MacAddr::read(&data[18..24]),
            target_proto_addr: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
        };

        if header.hw_type != HW_TYPE_ETHERNET {
            return Err(SanityError::structural(format!(
                "ARP hardware type {} is not Ethernet",
                header.hw_type
            )));
        }
        if header.proto_type != ether_type::IPV4 {
            return Err(SanityError::structural(format!(
                "ARP protocol type {:#06x} is not IPv4",
                header.proto_type
            )));
        }
        if header.hw_len != HW_LEN_ETHERNET || header.proto_len != PROTO_LEN_IPV4 {
            return Err(SanityError::structural(format!(
                "ARP address lengths {}/{} do not match Ethernet/IPv4",
                header.hw_len, header.proto_len
            )));
        }
        if header.op().is_none() {
            return Err(SanityError::structural(format!(
                "ARP operation {} unknown",
                header.operation
            )));
        }

        Ok(header)
    }
}

impl fmt::Display for ArpHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op() {
            Some(ArpOperation::Request) => "request",
            Some(ArpOperation::Reply) => "reply",
            None => return write!(f, "ARP unknown operation {}", self.operation),
        };
        write!(
            f,
            "ARP {} {} / {} > {} / {}",
            op,
            self.sender_proto_addr,
            self.sender_hw_addr,
            self.target_proto_addr,
            self.target_hw_addr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request() -> ArpHeader {
        ArpHeader::request(
            MacAddr([0x02, 0, 0, 0, 0, 0x09]),
            Ipv4Addr::new(10, 0, 0, 9),
            Ipv4Addr::new(10, 0, 0, 7),
        )
    }

    #[test]
    fn test_wire_layout() {
        let bytes = request().to_bytes();
        assert_eq!(
            &bytes[..8],
            &[0x00, 0x01, 0x08, 0x00, 0x06, 0x04, 0x00, 0x01]
        );
        assert_eq!(&bytes[14..18], &[10, 0, 0, 9]);
        assert_eq!(&bytes[18..24], &[0; 6]);
        assert_eq!(&bytes[24..28], &[10, 0, 0, 7]);
    }

    #[test]
    fn test_decode_round_trip() {
        let buf = Bytes::copy_from_slice(&request().to_bytes());
        let header = ArpHeader::decode(&Cursor::new(&buf), None).unwrap();
        assert_eq!(header, request());
        assert_eq!(header.op(), Some(ArpOperation::Request));
    }

    #[test]
    fn test_reply_swaps_addresses() {
        let ours = MacAddr([0x02, 0, 0, 0, 0, 0x07]);
        let reply = ArpHeader::reply_to(&request(), ours);
        assert_eq!(reply.op(), Some(ArpOperation::Reply));
        assert_eq!(reply.sender_hw_addr, ours);
        assert_eq!(reply.sender_proto_addr, Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(reply.target_hw_addr, request().sender_hw_addr);
        assert_eq!(reply.target_proto_addr, Ipv4Addr::new(10, 0, 0, 9));
    }

    #[test]
    fn test_rejects_wrong_lengths() {
        let mut bytes = request().to_bytes();
        bytes[4] = 8;
        let buf = Bytes::copy_from_slice(&bytes);
        assert!(matches!(
            ArpHeader::decode(&Cursor::new(&buf), None),
            Err(SanityError::Structural(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_operation() {
        let mut bytes = request().to_bytes();
        bytes[7] = 9;
        let buf = Bytes::copy_from_slice(&bytes);
        assert!(ArpHeader::decode(&Cursor::new(&buf), None).is_err());
    }

    #[test]
    fn test_truncated() {
        let buf = Bytes::copy_from_slice(&request().to_bytes()[..27]);
        assert!(matches!(
            ArpHeader::decode(&Cursor::new(&buf), None),
            Err(SanityError::Truncated { needed: 28, .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            request().to_string(),
            "ARP request 10.0.0.9 / 02:00:00:00:00:09 > 10.0.0.7 / 00:00:00:00:00:00"
        );
    }
}
