//! Outbound packet construction
//!
//! Packets are encoded from the innermost layer outwards so every length and
//! checksum field is computed over the bytes that will actually be sent. The
//! finished frame is walked once more by the parser, which gives the
//! descriptor the exact header values that go on the wire.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};

use bytes::Bytes;

use super::{PacketDescriptor, PacketParser};
use crate::error::{Result, StackError};
use crate::link::{ether_type, ArpHeader, EtherHeader, MacAddr};
use crate::network::{protocol, IcmpHeader, Ipv4Header, Ipv6Header, PseudoHeader};
use crate::tracker::Tracker;
use crate::transport::{TcpHeader, UdpHeader};

const DEFAULT_TTL: u8 = 64;

static IPV4_ID: AtomicU16 = AtomicU16::new(1);

fn next_ipv4_id() -> u16 {
    IPV4_ID.fetch_add(1, Ordering::Relaxed)
}

/// Encoder for frames leaving one interface
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    src_mac: MacAddr,
    dst_mac: MacAddr,
    ttl: u8,
    hop_limit: u8,
    parent: Option<Tracker>,
}

impl PacketBuilder {
    pub fn new(src_mac: MacAddr, dst_mac: MacAddr) -> Self {
        PacketBuilder {
            src_mac,
            dst_mac,
            ttl: DEFAULT_TTL,
            hop_limit: DEFAULT_TTL,
            parent: None,
        }
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    /// Mark the built packet as a response to the packet tracked by `parent`
    pub fn in_reply_to(mut self, parent: &Tracker) -> Self {
        self.parent = Some(*parent);
        self
    }

    /// UDP datagram from `src` to `dst`
    pub fn udp(
        &self,
        src: (IpAddr, u16),
        dst: (IpAddr, u16),
        payload: &[u8],
    ) -> Result<PacketDescriptor> {
        let udp = UdpHeader::new(src.1, dst.1);
        let packet = self.ip_packet(protocol::UDP, src.0, dst.0, |pseudo| {
            udp.encode(pseudo, payload)
        })?;
        Ok(self.frame(packet))
    }

    /// TCP segment; the caller owns sequencing and flags
    pub fn tcp(
        &self,
        src: IpAddr,
        dst: IpAddr,
        header: &TcpHeader,
        payload: &[u8],
    ) -> Result<PacketDescriptor> {
        let packet = self.ip_packet(protocol::TCP, src, dst, |pseudo| {
            header.encode(pseudo, payload)
        })?;
        Ok(self.frame(packet))
    }

    /// ICMP message; ICMPv4 or ICMPv6 is chosen from the address family
    pub fn icmp(&self, src: IpAddr, dst: IpAddr, icmp: &IcmpHeader) -> Result<PacketDescriptor> {
        let proto = match src {
            IpAddr::V4(_) => protocol::ICMP,
            IpAddr::V6(_) => protocol::ICMPV6,
        };
        let packet = self.ip_packet(proto, src, dst, |pseudo| match pseudo {
            PseudoHeader::V4 { .. } => icmp.encode(None),
            PseudoHeader::V6 { .. } => icmp.encode(Some(pseudo)),
        })?;
        Ok(self.frame(packet))
    }

    /// ARP message framed directly on Ethernet
    pub fn arp(&self, arp: &ArpHeader) -> PacketDescriptor {
        self.frame((ether_type::ARP, arp.to_bytes().to_vec()))
    }

    /// Encode the IP header around the upper-layer message produced by `inner`
    fn ip_packet<F>(&self, proto: u8, src: IpAddr, dst: IpAddr, inner: F) -> Result<(u16, Vec<u8>)>
    where
        F: FnOnce(&PseudoHeader) -> Result<Vec<u8>>,
    {
        match (src, dst) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                let ip = Ipv4Header::new(proto, src, dst)
                    .with_ttl(self.ttl)
                    .with_id(next_ipv4_id());
                let message = inner(&ip.pseudo_header())?;
                let mut packet = ip.encode(message.len())?;
                packet.extend_from_slice(&message);
                Ok((ether_type::IPV4, packet))
            }
            (IpAddr::V6(src), IpAddr::V6(dst)) => {
                let ip = Ipv6Header::new(proto, src, dst).with_hop_limit(self.hop_limit);
                let message = inner(&ip.pseudo_header())?;
                let mut packet = ip.encode(message.len())?.to_vec();
                packet.extend_from_slice(&message);
                Ok((ether_type::IPV6, packet))
            }
            (src, dst) => Err(StackError::AddressFamilyMismatch(src, dst)),
        }
    }

    fn frame(&self, (ethertype, packet): (u16, Vec<u8>)) -> PacketDescriptor {
        let ether = EtherHeader::new(self.src_mac, self.dst_mac, ethertype);
        let mut frame = Vec::with_capacity(ether.to_bytes().len() + packet.len());
        frame.extend_from_slice(&ether.to_bytes());
        frame.extend_from_slice(&packet);

        let tracker = Tracker::tx(self.parent.as_ref());
        PacketParser::parse_tracked(Bytes::from(frame), tracker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::icmp::{ICMP6_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REPLY};
    use crate::packet::{Header, Layer};
    use crate::tracker::Direction;
    use crate::transport::tcp::flags;

    const LOCAL_MAC: MacAddr = MacAddr([2, 0, 0, 0, 0, 7]);
    const PEER_MAC: MacAddr = MacAddr([2, 0, 0, 0, 0, 9]);

    fn builder() -> PacketBuilder {
        PacketBuilder::new(LOCAL_MAC, PEER_MAC)
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_udp_ipv4() {
        let packet = builder()
            .udp((ip("10.0.0.7"), 7), (ip("10.0.0.9"), 40000), b"echo")
            .unwrap();
        assert!(packet.is_parsed());
        assert_eq!(packet.tracker().id().direction, Direction::Tx);
        assert_eq!(packet.tracker().parent(), None);

        let ether = packet.ether().unwrap();
        assert_eq!(ether.src, LOCAL_MAC);
        assert_eq!(ether.dst, PEER_MAC);
        let ipv4 = packet.ipv4().unwrap();
        assert_eq!(ipv4.total_len, 20 + 8 + 4);
        assert_eq!(ipv4.ttl, 64);
        let udp = packet.udp().unwrap();
        assert_eq!((udp.src_port, udp.dst_port, udp.length), (7, 40000, 12));
        assert_ne!(udp.checksum, 0);
        assert_eq!(&packet.payload().unwrap()[..], b"echo");
    }

    #[test]
    fn test_udp_ipv6() {
        let packet = builder()
            .hop_limit(1)
            .udp((ip("fe80::7"), 7), (ip("fe80::9"), 40000), b"six")
            .unwrap();
        assert!(packet.is_parsed());
        let ipv6 = packet.ipv6().unwrap();
        assert_eq!(ipv6.hop_limit, 1);
        assert_eq!(ipv6.payload_length, 8 + 3);
        assert_eq!(packet.ether().unwrap().ethertype, ether_type::IPV6);
    }

    #[test]
    fn test_mixed_families_rejected() {
        let err = builder()
            .udp((ip("10.0.0.7"), 7), (ip("fe80::9"), 40000), b"x")
            .unwrap_err();
        assert!(matches!(err, StackError::AddressFamilyMismatch(_, _)));
    }

    #[test]
    fn test_icmp_reply_carries_parent() {
        let request = Tracker::rx();
        let reply = IcmpHeader::echo(ICMP_TYPE_ECHO_REPLY, 3, 4, Bytes::from_static(b"ping"));
        let packet = builder()
            .in_reply_to(&request)
            .icmp(ip("10.0.0.7"), ip("10.0.0.9"), &reply)
            .unwrap();
        assert!(packet.is_parsed());
        assert_eq!(packet.tracker().parent(), Some(request.id()));
        assert!(matches!(packet.layers()[2], Header::Icmp4(_)));
        assert_eq!(packet.icmp().unwrap().message_seq, 4);
    }

    #[test]
    fn test_icmp6_reply() {
        let reply = IcmpHeader::echo(ICMP6_TYPE_ECHO_REPLY, 3, 4, Bytes::from_static(b"ping"));
        let packet = builder()
            .icmp(ip("fe80::7"), ip("fe80::9"), &reply)
            .unwrap();
        assert!(packet.is_parsed(), "{}", packet);
        assert!(matches!(packet.layers()[2], Header::Icmp6(_)));
    }

    #[test]
    fn test_tcp_segment() {
        let header = TcpHeader::new(80, 51000, 1, 1001, flags::SYN | flags::ACK);
        let packet = builder()
            .tcp(ip("10.0.0.7"), ip("10.0.0.9"), &header, b"")
            .unwrap();
        assert!(packet.is_parsed());
        let tcp = packet.tcp().unwrap();
        assert!(tcp.is_syn() && tcp.is_ack());
    }

    #[test]
    fn test_arp_frame() {
        let request = ArpHeader::request(PEER_MAC, "10.0.0.9".parse().unwrap(), "10.0.0.7".parse().unwrap());
        let reply = ArpHeader::reply_to(&request, LOCAL_MAC);
        let packet = builder().arp(&reply);
        assert_eq!(
            packet.status(),
            &crate::packet::Status::Parsed {
                last: Layer::Arp,
                payload: 42..42
            }
        );
        assert_eq!(packet.arp(), Some(&reply));
    }

    #[test]
    fn test_ipv4_ids_advance() {
        let first = builder()
            .udp((ip("10.0.0.7"), 7), (ip("10.0.0.9"), 1), b"")
            .unwrap();
        let second = builder()
            .udp((ip("10.0.0.7"), 7), (ip("10.0.0.9"), 1), b"")
            .unwrap();
        assert_ne!(first.ipv4().unwrap().id, second.ipv4().unwrap().id);
    }
}
