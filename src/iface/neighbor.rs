//! Minimal neighbor table
//!
//! Entries are learned from the source addresses of inbound frames. There is
//! no resolution, ageing or eviction.

use std::collections::HashMap;
use std::net::IpAddr;

use tracing::trace;

use crate::error::{Result, StackError};
use crate::link::MacAddr;

#[derive(Debug, Default)]
pub struct NeighborTable {
    entries: HashMap<IpAddr, MacAddr>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that `ip` is reachable at `mac`.
    ///
    /// Group and unspecified addresses are never learned.
    pub fn learn(&mut self, ip: IpAddr, mac: MacAddr) {
        if ip.is_unspecified() || ip.is_multicast() || mac.is_multicast() || mac == MacAddr::ZERO {
            return;
        }
        if let IpAddr::V4(v4) = ip {
            if v4.is_broadcast() {
                return;
            }
        }
        if self.entries.insert(ip, mac) != Some(mac) {
            trace!("Learned neighbor {} at {}", ip, mac);
        }
    }

    pub fn lookup(&self, ip: &IpAddr) -> Option<MacAddr> {
        self.entries.get(ip).copied()
    }

    /// Link address for `ip`: limited broadcast maps directly, anything else
    /// must have been learned
    pub fn resolve(&self, ip: &IpAddr) -> Result<MacAddr> {
        match ip {
            IpAddr::V4(v4) if v4.is_broadcast() => Ok(MacAddr::BROADCAST),
            _ => self.lookup(ip).ok_or(StackError::UnresolvedNeighbor(*ip)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
