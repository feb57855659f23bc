//! Network layer protocols implementation
//!
//! This module contains implementations for network layer protocols:
//! - IPv4: Internet Protocol version 4
//! - IPv6: Internet Protocol version 6
//! - ICMP: Internet Control Message Protocol (v4 and v6 share the codec)
//!
//! It also hosts the Internet checksum and the pseudo-headers used by
//! transport checksums.

pub mod icmp;
pub mod ipv4;
pub mod ipv6;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{SanityError, StackError};

// Re-export commonly used items
pub use icmp::IcmpHeader;
pub use ipv4::{protocol, Ipv4Header};
pub use ipv6::Ipv6Header;

/// Calculate Internet checksum
///
/// Algorithm: Sum data in 16-bit chunks, add carry bits to the sum,
/// and return the one's complement of the result.
/// This is used for the IPv4 header and ICMPv4 checksums.
pub fn checksum(data: &[u8]) -> u16 {
    compute(&[], data)
}

/// Calculate Internet checksum over `pseudo` followed by `data`.
///
/// `pseudo` must have even length (both pseudo-header forms do) so that the
/// 16-bit word boundaries of `data` are preserved. An odd-length `data` is
/// padded with one zero byte for the sum only.
pub fn compute(pseudo: &[u8], data: &[u8]) -> u16 {
    debug_assert!(pseudo.len() % 2 == 0);
    !fold(sum_words(pseudo) + sum_words(data))
}

/// Check a stored checksum against the one computed over `pseudo` + `data`.
///
/// `offset` is the position of the 16-bit checksum field inside `data`; the
/// field is treated as zero while summing. A stored value of zero means the
/// sender did not supply a checksum and is always accepted. 0xFFFF and 0x0000
/// are the same value in one's complement, so a computed zero matches a
/// stored 0xFFFF.
pub fn verify(pseudo: &[u8], data: &[u8], offset: usize) -> Result<(), SanityError> {
    let stored = match data.get(offset..offset + 2) {
        Some(field) => u16::from_be_bytes([field[0], field[1]]),
        None => {
            return Err(SanityError::Truncated {
                needed: offset + 2,
                available: data.len(),
            })
        }
    };
    if stored == 0 {
        return Ok(());
    }

    debug_assert!(offset % 2 == 0);
    let sum = sum_words(pseudo) + sum_words(data) - stored as u64;
    let computed = !fold(sum);
    if computed == stored || (stored == 0xFFFF && computed == 0) {
        Ok(())
    } else {
        Err(SanityError::ChecksumMismatch { stored, computed })
    }
}

fn sum_words(data: &[u8]) -> u64 {
    let mut sum = 0u64;

    // Process data in 2-byte chunks
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u64;
    }

    // Handle odd-length data by padding with zero
    if let Some(&last_byte) = chunks.remainder().first() {
        sum += (last_byte as u64) << 8;
    }

    sum
}

fn fold(mut sum: u64) -> u16 {
    // Add carry bits
    while (sum >> 16) > 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// Checksum-only header built from the addressing of the enclosing IP packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoHeader {
    /// src(4) + dst(4) + zero(1) + protocol(1) + length(2) = 12 bytes
    V4 {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        protocol: u8,
        length: u16,
    },
    /// src(16) + dst(16) + length(4) + zero(3) + next header(1) = 40 bytes
    V6 {
        src: Ipv6Addr,
        dst: Ipv6Addr,
        next_header: u8,
        length: u32,
    },
}

impl PseudoHeader {
    /// Build the pseudo-header for an upper-layer message of `length` bytes.
    pub fn new(src: IpAddr, dst: IpAddr, protocol: u8, length: usize) -> Result<Self, StackError> {
        match (src, dst) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                let length = u16::try_from(length).map_err(|_| StackError::FieldOverflow {
                    field: "pseudo-header length",
                    value: length,
                    max: u16::MAX as usize,
                })?;
                Ok(PseudoHeader::V4 { src, dst, protocol, length })
            }
            (IpAddr::V6(src), IpAddr::V6(dst)) => {
                let length = u32::try_from(length).map_err(|_| StackError::FieldOverflow {
                    field: "pseudo-header length",
                    value: length,
                    max: u32::MAX as usize,
                })?;
                Ok(PseudoHeader::V6 {
                    src,
                    dst,
                    next_header: protocol,
                    length,
                })
            }
            (src, dst) => Err(StackError::AddressFamilyMismatch(src, dst)),
        }
    }

    /// Same addressing and protocol for a message of `length` bytes
    pub fn with_length(&self, length: usize) -> Result<Self, StackError> {
        PseudoHeader::new(self.src(), self.dst(), self.protocol(), length)
    }

    pub fn protocol(&self) -> u8 {
        match self {
            PseudoHeader::V4 { protocol, .. } => *protocol,
            PseudoHeader::V6 { next_header, .. } => *next_header,
        }
    }

    pub fn src(&self) -> IpAddr {
        match self {
            PseudoHeader::V4 { src, .. } => IpAddr::V4(*src),
            PseudoHeader::V6 { src, .. } => IpAddr::V6(*src),
        }
    }

    pub fn dst(&self) -> IpAddr {
        match self {
            PseudoHeader::V4 { dst, .. } => IpAddr::V4(*dst),
            PseudoHeader::V6 { dst, .. } => IpAddr::V6(*dst),
        }
    }

    pub fn length(&self) -> usize {
        match self {
            PseudoHeader::V4 { length, .. } => *length as usize,
            PseudoHeader::V6 { length, .. } => *length as usize,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PseudoHeader::V4 { src, dst, protocol, length } => {
                let mut bytes = Vec::with_capacity(12);
                bytes.extend_from_slice(&src.octets());
                bytes.extend_from_slice(&dst.octets());
                bytes.push(0);
                bytes.push(*protocol);
                bytes.extend_from_slice(&length.to_be_bytes());
                bytes
            }
            PseudoHeader::V6 { src, dst, next_header, length } => {
                let mut bytes = Vec::with_capacity(40);
                bytes.extend_from_slice(&src.octets());
                bytes.extend_from_slice(&dst.octets());
                bytes.extend_from_slice(&length.to_be_bytes());
                bytes.extend_from_slice(&[0, 0, 0]);
                bytes.push(*next_header);
                bytes
            }
        }
    }

    /// Checksum of this pseudo-header followed by `data`
    pub fn checksum(&self, data: &[u8]) -> u16 {
        compute(&self.to_bytes(), data)
    }

    /// Verify the checksum field at `offset` of `data` against this pseudo-header
    pub fn verify(&self, data: &[u8], offset: usize) -> Result<(), SanityError> {
        verify(&self.to_bytes(), data, offset)
    }
}
