//! Interface configuration
//!
//! Loading configuration from disk is left to the embedding program; this is
//! the plain value the stack is constructed from.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::link::MacAddr;

const DEFAULT_TTL: u8 = 64;
const DEFAULT_HOP_LIMIT: u8 = 64;

/// Addresses and defaults for one network interface
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Link address of the interface
    pub mac: MacAddr,
    /// IPv4 address the interface answers for
    pub ipv4: Ipv4Addr,
    /// Network mask of the IPv4 subnet
    pub netmask: Ipv4Addr,
    /// Optional IPv6 address the interface answers for
    pub ipv6: Option<Ipv6Addr>,
    /// Time to live for outbound IPv4 packets
    pub ttl: u8,
    /// Hop limit for outbound IPv6 packets
    pub hop_limit: u8,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            mac: MacAddr([0x02, 0x00, 0x00, 0x77, 0x77, 0x77]),
            ipv4: Ipv4Addr::new(10, 0, 0, 7),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            ipv6: None,
            ttl: DEFAULT_TTL,
            hop_limit: DEFAULT_HOP_LIMIT,
        }
    }
}

impl StackConfig {
    pub fn new(mac: MacAddr, ipv4: Ipv4Addr) -> Self {
        Self {
            mac,
            ipv4,
            ..Self::default()
        }
    }

    pub fn with_ipv6(mut self, ipv6: Ipv6Addr) -> Self {
        self.ipv6 = Some(ipv6);
        self
    }

    pub fn with_netmask(mut self, netmask: Ipv4Addr) -> Self {
        self.netmask = netmask;
        self
    }

    /// Directed broadcast address of our IPv4 subnet
    pub fn broadcast_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.ipv4) | !u32::from(self.netmask))
    }

    /// Limited or directed IPv4 broadcast
    pub fn is_broadcast(&self, addr: &Ipv4Addr) -> bool {
        addr.is_broadcast() || *addr == self.broadcast_address()
    }

    /// Check whether an inbound destination address belongs to this interface.
    ///
    /// Broadcast is accepted for IPv4 and all multicast for IPv6.
    pub fn is_for_us(&self, addr: &IpAddr) -> bool {
        match addr {
            IpAddr::V4(v4) => *v4 == self.ipv4 || self.is_broadcast(v4),
            IpAddr::V6(v6) => Some(*v6) == self.ipv6 || v6.is_multicast(),
        }
    }

    /// Pick the local address used as source towards `remote`.
    pub fn source_for(&self, remote: &IpAddr) -> Option<IpAddr> {
        match remote {
            IpAddr::V4(_) => Some(IpAddr::V4(self.ipv4)),
            IpAddr::V6(_) => self.ipv6.map(IpAddr::V6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_for_us() {
        let config = StackConfig::default().with_ipv6("fe80::7".parse().unwrap());
        assert!(config.is_for_us(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))));
        assert!(config.is_for_us(&IpAddr::V4(Ipv4Addr::BROADCAST)));
        assert!(config.is_for_us(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 255))));
        assert!(!config.is_for_us(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 8))));
        assert!(config.is_for_us(&"fe80::7".parse().unwrap()));
        assert!(config.is_for_us(&"ff02::1".parse().unwrap()));
    }

    #[test]
    fn test_broadcast_detection() {
        let config = StackConfig::new(MacAddr::ZERO, Ipv4Addr::new(192, 168, 1, 1))
            .with_netmask(Ipv4Addr::new(255, 255, 0, 0));
        assert_eq!(config.broadcast_address(), Ipv4Addr::new(192, 168, 255, 255));
        assert!(config.is_broadcast(&Ipv4Addr::BROADCAST));
        assert!(!config.is_broadcast(&Ipv4Addr::new(192, 168, 1, 255)));
    }

    #[test]
    fn test_source_selection() {
        let config = StackConfig::default();
        assert_eq!(
            config.source_for(&"10.0.0.9".parse().unwrap()),
            Some(IpAddr::V4(config.ipv4))
        );
        assert_eq!(config.source_for(&"fe80::9".parse().unwrap()), None);
    }
}
