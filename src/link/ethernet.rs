//! Ethernet II framing
//!
//! 14-byte header: destination(6) + source(6) + ethertype(2)

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use super::MacAddr;
use crate::error::SanityError;
use crate::network::PseudoHeader;
use crate::packet::{Codec, Cursor};

pub const ETHER_HEADER_LEN: usize = 14;

/// Ethertype values
pub mod ether_type {
    /// Smallest value interpreted as an ethertype rather than an 802.3 length
    pub const MIN: u16 = 0x0600;
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const IPV6: u16 = 0x86DD;

    pub fn name(value: u16) -> &'static str {
        match value {
            IPV4 => "IPv4",
            ARP => "ARP",
            IPV6 => "IPv6",
            _ => "???",
        }
    }
}

/// Ethernet II header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtherHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
}

impl EtherHeader {
    pub fn new(src: MacAddr, dst: MacAddr, ethertype: u16) -> Self {
        EtherHeader { dst, src, ethertype }
    }

    /// Convert Ethernet header to bytes
    pub fn to_bytes(&self) -> [u8; ETHER_HEADER_LEN] {
        let mut bytes = [0u8; ETHER_HEADER_LEN];
        bytes[0..6].copy_from_slice(&self.dst.0);
        bytes[6..12].copy_from_slice(&self.src.0);
        BigEndian::write_u16(&mut bytes[12..14], self.ethertype);
        bytes
    }
}

impl Codec for EtherHeader {
    const HEADER_LEN: usize = ETHER_HEADER_LEN;

    fn decode(cursor: &Cursor<'_>, _pseudo: Option<&PseudoHeader>) -> Result<Self, SanityError> {
        let data = cursor.header(ETHER_HEADER_LEN)?;

        let ethertype = BigEndian::read_u16(&data[12..14]);
        if ethertype < ether_type::MIN {
            return Err(SanityError::structural(format!(
                "ethertype {:#06x} below minimum {:#06x}",
                ethertype,
                ether_type::MIN
            )));
        }

        Ok(EtherHeader {
            dst: MacAddr::read(&data[0..6]),
            src: MacAddr::read(&data[6..12]),
            ethertype,
        })
    }
}

impl fmt::Display for EtherHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ETHER {} > {}, {:#06x} ({})",
            self.src,
            self.dst,
            self.ethertype,
            ether_type::name(self.ethertype)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame() -> Bytes {
        let mut bytes = vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        bytes.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x09]);
        bytes.extend_from_slice(&[0x08, 0x06]);
        Bytes::from(bytes)
    }

    #[test]
    fn test_decode() {
        let buf = frame();
        let header = EtherHeader::decode(&Cursor::new(&buf), None).unwrap();
        assert_eq!(header.dst, MacAddr::BROADCAST);
        assert_eq!(header.src, MacAddr([0x02, 0, 0, 0, 0, 0x09]));
        assert_eq!(header.ethertype, ether_type::ARP);
        assert_eq!(&header.to_bytes()[..], &buf[..]);
    }

    #[test]
    fn test_truncated() {
        let buf = Bytes::from_static(&[0u8; 13]);
        assert_eq!(
            EtherHeader::decode(&Cursor::new(&buf), None),
            Err(SanityError::Truncated {
                needed: 14,
                available: 13
            })
        );
    }

    #[test]
    fn test_rejects_length_field() {
        let mut bytes = frame().to_vec();
        bytes[12..14].copy_from_slice(&[0x05, 0xdc]);
        let buf = Bytes::from(bytes);
        assert!(matches!(
            EtherHeader::decode(&Cursor::new(&buf), None),
            Err(SanityError::Structural(_))
        ));
    }

    #[test]
    fn test_display() {
        let header = EtherHeader::new(MacAddr([2, 0, 0, 0, 0, 1]), MacAddr::BROADCAST, ether_type::IPV4);
        assert_eq!(
            header.to_string(),
            "ETHER 02:00:00:00:00:01 > ff:ff:ff:ff:ff:ff, 0x0800 (IPv4)"
        );
    }
}
