//! UDP (User Datagram Protocol) implementation
//!
//! This module provides UDP header parsing and datagram construction
//! (RFC 768).

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{SanityError, StackError};
use crate::network::PseudoHeader;
use crate::packet::{Codec, Cursor};

/// UDP header length in bytes
pub const UDP_HEADER_LEN: usize = 8;

/// UDP packet header structure
///
/// Represents the standard 8-byte UDP header as defined in RFC 768
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16, // Length of UDP header and data
    pub checksum: u16,
}

impl UdpHeader {
    pub fn new(src_port: u16, dst_port: u16) -> Self {
        UdpHeader {
            src_port,
            dst_port,
            length: UDP_HEADER_LEN as u16,
            checksum: 0,
        }
    }

    /// Convert UDP header to bytes
    pub fn to_bytes(&self) -> [u8; UDP_HEADER_LEN] {
        let mut bytes = [0u8; UDP_HEADER_LEN];
        BigEndian::write_u16(&mut bytes[0..2], self.src_port);
        BigEndian::write_u16(&mut bytes[2..4], self.dst_port);
        BigEndian::write_u16(&mut bytes[4..6], self.length);
        BigEndian::write_u16(&mut bytes[6..8], self.checksum);
        bytes
    }

    /// Number of data bytes following the header
    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(UDP_HEADER_LEN)
    }

    /// Build a complete datagram carrying `payload`
    ///
    /// Length and checksum are computed here. A computed checksum of zero is
    /// transmitted as 0xFFFF because zero on the wire means "no checksum".
    pub fn encode(&self, pseudo: &PseudoHeader, payload: &[u8]) -> Result<Vec<u8>, StackError> {
        let total_len = UDP_HEADER_LEN + payload.len();
        if total_len > u16::MAX as usize {
            return Err(StackError::FieldOverflow {
                field: "UDP length",
                value: total_len,
                max: u16::MAX as usize,
            });
        }

        let header = UdpHeader {
            length: total_len as u16,
            checksum: 0,
            ..*self
        };
        let mut datagram = Vec::with_capacity(total_len);
        datagram.extend_from_slice(&header.to_bytes());
        datagram.extend_from_slice(payload);

        let sum = pseudo.with_length(total_len)?.checksum(&datagram);
        let sum = if sum == 0 { 0xFFFF } else { sum };
        BigEndian::write_u16(&mut datagram[6..8], sum);
        Ok(datagram)
    }
}

impl Codec for UdpHeader {
    const HEADER_LEN: usize = UDP_HEADER_LEN;

    /// Decode the UDP header; the checksum is verified when the enclosing IP
    /// layer supplied a pseudo-header and the sender supplied a checksum.
    fn decode(cursor: &Cursor<'_>, pseudo: Option<&PseudoHeader>) -> Result<Self, SanityError> {
        let data = cursor.header(UDP_HEADER_LEN)?;

        let header = UdpHeader {
            src_port: BigEndian::read_u16(&data[0..2]),
            dst_port: BigEndian::read_u16(&data[2..4]),
            length: BigEndian::read_u16(&data[4..6]),
            checksum: BigEndian::read_u16(&data[6..8]),
        };

        // Validate length
        let length = header.length as usize;
        if length < UDP_HEADER_LEN {
            return Err(SanityError::structural(format!(
                "UDP length {} shorter than header",
                length
            )));
        }
        if length > cursor.remaining() {
            return Err(SanityError::Truncated {
                needed: length,
                available: cursor.remaining(),
            });
        }

        // Validate checksum (if not zero)
        if let (Some(pseudo), true) = (pseudo, header.checksum != 0) {
            let pseudo = pseudo
                .with_length(length)
                .map_err(|e| SanityError::structural(e.to_string()))?;
            pseudo.verify(&cursor.bytes()[..length], 6)?;
        }

        Ok(header)
    }
}

impl fmt::Display for UdpHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UDP {} > {}, len {}",
            self.src_port, self.dst_port, self.length
        )
    }
}
