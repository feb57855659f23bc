//! Link layer protocols implementation
//!
//! - Ethernet II framing
//! - ARP for Ethernet/IPv4

pub mod arp;
pub mod ethernet;

use std::fmt;
use std::str::FromStr;

pub use arp::{ArpHeader, ArpOperation};
pub use ethernet::{ether_type, EtherHeader};

/// 48-bit Ethernet hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Broadcast address (FF:FF:FF:FF:FF:FF)
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    /// Unspecified address, used as target in ARP requests
    pub const ZERO: MacAddr = MacAddr([0x00; 6]);

    /// Read from a slice already checked to hold six bytes
    pub(crate) fn read(data: &[u8]) -> Self {
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(&data[..6]);
        MacAddr(bytes)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Error returned when parsing a textual MAC address
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address: {0}")]
pub struct ParseMacError(String);

impl FromStr for MacAddr {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| ParseMacError(s.to_string()))?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ParseMacError(s.to_string()));
        }
        Ok(MacAddr(bytes))
    }
}
