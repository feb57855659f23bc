//! TCP (Transmission Control Protocol) header codec
//!
//! Only the segment format (RFC 793) lives here. Connection state is not
//! tracked by this stack; segment payloads are demultiplexed to sockets like
//! datagrams.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

use crate::error::{SanityError, StackError};
use crate::network::PseudoHeader;
use crate::packet::{Codec, Cursor};

/// TCP header length without options
pub const TCP_HEADER_LEN: usize = 20;
const TCP_MAX_HEADER_LEN: usize = 60;
const MIN_DATA_OFFSET: u8 = 5;

/// TCP control flags (low 9 bits of the offset/flags word)
pub mod flags {
    pub const FIN: u16 = 0x001;
    pub const SYN: u16 = 0x002;
    pub const RST: u16 = 0x004;
    pub const PSH: u16 = 0x008;
    pub const ACK: u16 = 0x010;
    pub const URG: u16 = 0x020;
    pub const ECE: u16 = 0x040;
    pub const CWR: u16 = 0x080;
    pub const NS: u16 = 0x100;
    pub const MASK: u16 = 0x1FF;
}

/// TCP segment header structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub data_offset: u8, // header length in 32-bit words
    pub flags: u16,
    pub window: u16,
    pub checksum: u16,
    pub urgent_ptr: u16,
    pub options: Bytes,
}

impl TcpHeader {
    pub fn new(src_port: u16, dst_port: u16, seq: u32, ack: u32, flags: u16) -> Self {
        TcpHeader {
            src_port,
            dst_port,
            seq,
            ack,
            data_offset: MIN_DATA_OFFSET,
            flags: flags & flags::MASK,
            window: 0xFFFF,
            checksum: 0,
            urgent_ptr: 0,
            options: Bytes::new(),
        }
    }

    /// Check if SYN flag is set
    pub fn is_syn(&self) -> bool {
        self.flags & flags::SYN != 0
    }

    /// Check if ACK flag is set
    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    /// Check if FIN flag is set
    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    /// Check if RST flag is set
    pub fn is_rst(&self) -> bool {
        self.flags & flags::RST != 0
    }

    /// Check if PSH flag is set
    pub fn is_psh(&self) -> bool {
        self.flags & flags::PSH != 0
    }

    /// Get the data offset (header length) in bytes
    pub fn header_len(&self) -> usize {
        self.data_offset as usize * 4
    }

    /// Serialize the header exactly as its fields stand
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; TCP_HEADER_LEN];
        BigEndian::write_u16(&mut bytes[0..2], self.src_port);
        BigEndian::write_u16(&mut bytes[2..4], self.dst_port);
        BigEndian::write_u32(&mut bytes[4..8], self.seq);
        BigEndian::write_u32(&mut bytes[8..12], self.ack);
        let word = ((self.data_offset as u16) << 12) | (self.flags & flags::MASK);
        BigEndian::write_u16(&mut bytes[12..14], word);
        BigEndian::write_u16(&mut bytes[14..16], self.window);
        BigEndian::write_u16(&mut bytes[16..18], self.checksum);
        BigEndian::write_u16(&mut bytes[18..20], self.urgent_ptr);
        bytes.extend_from_slice(&self.options);
        bytes
    }

    /// Build a complete segment carrying `payload`
    ///
    /// Data offset and checksum are computed from the options and payload.
    pub fn encode(&self, pseudo: &PseudoHeader, payload: &[u8]) -> Result<Vec<u8>, StackError> {
        if self.options.len() % 4 != 0 {
            return Err(StackError::invalid_header(format!(
                "TCP options length {} is not a multiple of 4",
                self.options.len()
            )));
        }
        let header_len = TCP_HEADER_LEN + self.options.len();
        if header_len > TCP_MAX_HEADER_LEN {
            return Err(StackError::FieldOverflow {
                field: "TCP header length",
                value: header_len,
                max: TCP_MAX_HEADER_LEN,
            });
        }

        let header = TcpHeader {
            data_offset: (header_len / 4) as u8,
            checksum: 0,
            ..self.clone()
        };
        let mut segment = header.to_bytes();
        segment.extend_from_slice(payload);

        let sum = pseudo.with_length(segment.len())?.checksum(&segment);
        BigEndian::write_u16(&mut segment[16..18], sum);
        Ok(segment)
    }
}

impl Codec for TcpHeader {
    const HEADER_LEN: usize = TCP_HEADER_LEN;

    fn decode(cursor: &Cursor<'_>, pseudo: Option<&PseudoHeader>) -> Result<Self, SanityError> {
        let data = cursor.header(TCP_HEADER_LEN)?;

        let word = BigEndian::read_u16(&data[12..14]);
        let data_offset = (word >> 12) as u8;
        if data_offset < MIN_DATA_OFFSET {
            return Err(SanityError::structural(format!(
                "TCP data offset {} below 5",
                data_offset
            )));
        }
        let header_len = data_offset as usize * 4;
        cursor.header(header_len)?;

        if let Some(pseudo) = pseudo {
            let segment = cursor.bytes();
            let pseudo = pseudo
                .with_length(segment.len())
                .map_err(|e| SanityError::structural(e.to_string()))?;
            pseudo.verify(segment, 16)?;
        }

        Ok(TcpHeader {
            src_port: BigEndian::read_u16(&data[0..2]),
            dst_port: BigEndian::read_u16(&data[2..4]),
            seq: BigEndian::read_u32(&data[4..8]),
            ack: BigEndian::read_u32(&data[8..12]),
            data_offset,
            flags: word & flags::MASK,
            window: BigEndian::read_u16(&data[14..16]),
            checksum: BigEndian::read_u16(&data[16..18]),
            urgent_ptr: BigEndian::read_u16(&data[18..20]),
            options: cursor.slice(TCP_HEADER_LEN..header_len),
        })
    }

    fn header_len(&self) -> usize {
        TcpHeader::header_len(self)
    }
}

impl fmt::Display for TcpHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u16, &str); 9] = [
            (flags::SYN, "S"),
            (flags::ACK, "A"),
            (flags::FIN, "F"),
            (flags::RST, "R"),
            (flags::PSH, "P"),
            (flags::URG, "U"),
            (flags::ECE, "E"),
            (flags::CWR, "W"),
            (flags::NS, "N"),
        ];
        let set: String = NAMES
            .iter()
            .filter(|(bit, _)| self.flags & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        write!(
            f,
            "TCP {} > {}, {}, seq {}, ack {}, win {}",
            self.src_port, self.dst_port, set, self.seq, self.ack, self.window
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol;

    fn pseudo() -> PseudoHeader {
        PseudoHeader::new(
            "10.0.0.9".parse().unwrap(),
            "10.0.0.5".parse().unwrap(),
            protocol::TCP,
            0,
        )
        .unwrap()
    }

    fn syn() -> TcpHeader {
        TcpHeader::new(51000, 80, 1000, 0, flags::SYN)
    }

    #[test]
    fn test_flags() {
        let header = TcpHeader::new(1, 2, 0, 0, flags::SYN | flags::ACK);
        assert!(header.is_syn());
        assert!(header.is_ack());
        assert!(!header.is_fin());
        assert!(!header.is_rst());
        assert!(!header.is_psh());
    }

    #[test]
    fn test_encode_layout() {
        let segment = syn().encode(&pseudo(), &[]).unwrap();
        assert_eq!(segment.len(), 20);
        assert_eq!(&segment[12..14], &[0x50, 0x02]);
        assert_eq!(pseudo().with_length(20).unwrap().checksum(&segment), 0);
    }

    #[test]
    fn test_decode_round_trip_with_options() {
        let mut header = syn();
        // MSS 1460
        header.options = Bytes::from_static(&[0x02, 0x04, 0x05, 0xb4]);
        let buf = Bytes::from(header.encode(&pseudo(), b"data").unwrap());

        let decoded = TcpHeader::decode(&Cursor::new(&buf), Some(&pseudo())).unwrap();
        assert_eq!(decoded.header_len(), 24);
        assert_eq!(&decoded.options[..], &[0x02, 0x04, 0x05, 0xb4]);
        assert_eq!(decoded.seq, 1000);
        let again = decoded.encode(&pseudo(), &buf[24..]).unwrap();
        assert_eq!(&again[..], &buf[..]);
    }

    #[test]
    fn test_decode_rejects_bad_offset() {
        let mut bytes = syn().encode(&pseudo(), &[]).unwrap();
        bytes[12] = 0x40;
        let buf = Bytes::from(bytes);
        assert!(matches!(
            TcpHeader::decode(&Cursor::new(&buf), None),
            Err(SanityError::Structural(_))
        ));
    }

    #[test]
    fn test_decode_rejects_offset_past_buffer() {
        let mut bytes = syn().encode(&pseudo(), &[]).unwrap();
        bytes[12] = 0x60;
        let buf = Bytes::from(bytes);
        assert!(matches!(
            TcpHeader::decode(&Cursor::new(&buf), None),
            Err(SanityError::Truncated { needed: 24, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let mut bytes = syn().encode(&pseudo(), b"x").unwrap();
        bytes[20] = b'y';
        let buf = Bytes::from(bytes);
        assert!(matches!(
            TcpHeader::decode(&Cursor::new(&buf), Some(&pseudo())),
            Err(SanityError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(syn().to_string(), "TCP 51000 > 80, S, seq 1000, ack 0, win 65535");
    }

    #[test]
    fn test_display_congestion_flags() {
        let mut header = syn();
        header.flags = flags::SYN | flags::ECE | flags::CWR;
        assert_eq!(header.to_string(), "TCP 51000 > 80, SEW, seq 1000, ack 0, win 65535");

        header.flags = flags::ACK | flags::NS;
        assert_eq!(header.to_string(), "TCP 51000 > 80, AN, seq 1000, ack 0, win 65535");
    }
}
