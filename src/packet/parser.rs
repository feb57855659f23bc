//! Layered packet parser
//!
//! Walks a received frame from the Ethernet header inwards. Each step
//! decodes one header at the current cursor, then looks up the next layer
//! from that header's discriminator field. The walk stops at the first
//! sanity failure, at a terminal protocol, or at a discriminator value the
//! stack does not know (the remaining bytes are then opaque payload).

use bytes::Bytes;
use tracing::{debug, warn};

use super::{Codec, Cursor, Header, Layer, PacketDescriptor, Status};
use crate::error::SanityError;
use crate::link::{ether_type, ArpHeader, EtherHeader};
use crate::network::{protocol, IcmpHeader, Ipv4Header, Ipv6Header, PseudoHeader};
use crate::tracker::Tracker;
use crate::transport::{TcpHeader, UdpHeader};

/// Ethertype to layer carried by an Ethernet frame
const ETHER_NEXT: &[(u16, Layer)] = &[
    (ether_type::ARP, Layer::Arp),
    (ether_type::IPV4, Layer::Ipv4),
    (ether_type::IPV6, Layer::Ipv6),
];

/// IPv4 protocol number to layer
const IPV4_NEXT: &[(u8, Layer)] = &[
    (protocol::ICMP, Layer::Icmp4),
    (protocol::TCP, Layer::Tcp),
    (protocol::UDP, Layer::Udp),
];

/// IPv6 next-header value to layer
const IPV6_NEXT: &[(u8, Layer)] = &[
    (protocol::ICMPV6, Layer::Icmp6),
    (protocol::TCP, Layer::Tcp),
    (protocol::UDP, Layer::Udp),
];

fn lookup<K: PartialEq + Copy>(table: &[(K, Layer)], key: K) -> Option<Layer> {
    table.iter().find(|(k, _)| *k == key).map(|(_, layer)| *layer)
}

/// Layer selected by the discriminator of `header`
fn next_layer(header: &Header) -> Option<Layer> {
    match header {
        Header::Ether(h) => lookup(ETHER_NEXT, h.ethertype),
        // Fragments are not reassembled
        Header::Ipv4(h) if h.is_fragment() => None,
        Header::Ipv4(h) => lookup(IPV4_NEXT, h.protocol),
        Header::Ipv6(h) => lookup(IPV6_NEXT, h.next_header),
        _ => None,
    }
}

/// Bytes covered by `header` and its payload, when the header declares it
fn declared_len(header: &Header) -> Option<usize> {
    match header {
        Header::Ipv4(h) => Some(h.total_len as usize),
        Header::Ipv6(h) => Some(h.header_len() + h.payload_length as usize),
        Header::Udp(h) => Some(h.length as usize),
        _ => None,
    }
}

/// Pseudo-header handed to the layer carried inside `header`
fn pseudo_header(header: &Header) -> Option<PseudoHeader> {
    match header {
        Header::Ipv4(h) => Some(h.pseudo_header()),
        Header::Ipv6(h) => Some(h.pseudo_header()),
        _ => None,
    }
}

fn decode_layer(
    layer: Layer,
    cursor: &Cursor<'_>,
    pseudo: Option<&PseudoHeader>,
) -> Result<Header, SanityError> {
    match layer {
        Layer::Ether => EtherHeader::decode(cursor, pseudo).map(Header::Ether),
        Layer::Arp => ArpHeader::decode(cursor, pseudo).map(Header::Arp),
        Layer::Ipv4 => Ipv4Header::decode(cursor, pseudo).map(Header::Ipv4),
        Layer::Ipv6 => Ipv6Header::decode(cursor, pseudo).map(Header::Ipv6),
        Layer::Icmp4 => IcmpHeader::decode(cursor, None).map(Header::Icmp4),
        Layer::Icmp6 => IcmpHeader::decode(cursor, pseudo).map(Header::Icmp6),
        Layer::Udp => UdpHeader::decode(cursor, pseudo).map(Header::Udp),
        Layer::Tcp => TcpHeader::decode(cursor, pseudo).map(Header::Tcp),
    }
}

/// Entry point of the receive path
pub struct PacketParser;

impl PacketParser {
    /// Parse a received frame under a fresh RX tracker
    pub fn parse(frame: impl Into<Bytes>) -> PacketDescriptor {
        Self::parse_tracked(frame.into(), Tracker::rx())
    }

    /// Parse a received frame under the given tracker
    pub fn parse_tracked(frame: Bytes, tracker: Tracker) -> PacketDescriptor {
        let mut layers = Vec::new();
        let status = Self::walk(&frame, &tracker, &mut layers);
        PacketDescriptor::new(frame, layers, tracker, status)
    }

    fn walk(frame: &Bytes, tracker: &Tracker, layers: &mut Vec<Header>) -> Status {
        let mut cursor = Cursor::new(frame);
        let mut layer = Layer::Ether;
        let mut pseudo: Option<PseudoHeader> = None;

        loop {
            let header = match decode_layer(layer, &cursor, pseudo.as_ref()) {
                Ok(header) => header,
                Err(reason) => {
                    warn!("{} - {} {}", tracker, layer, reason);
                    return Status::Failed { layer, reason };
                }
            };
            debug!("{} - {}", tracker, header);

            // Decoding already checked the declared length against the buffer
            let carried = match declared_len(&header) {
                Some(len) => match cursor.limit(len) {
                    Ok(carried) => carried,
                    Err(reason) => return Status::Failed { layer, reason },
                },
                None => cursor,
            };
            cursor = carried.advance(header.header_len());
            pseudo = pseudo_header(&header);
            let next = next_layer(&header);
            layers.push(header);

            match next {
                Some(next) if !layer.is_terminal() => layer = next,
                _ => {
                    return Status::Parsed {
                        last: layer,
                        payload: cursor.range(),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MacAddr;
    use crate::network::icmp::ICMP_TYPE_ECHO_REQUEST;
    use std::net::Ipv4Addr;

    const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 9);
    const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

    fn ether(ethertype: u16) -> Vec<u8> {
        EtherHeader::new(MacAddr([2, 0, 0, 0, 0, 9]), MacAddr([2, 0, 0, 0, 0, 5]), ethertype)
            .to_bytes()
            .to_vec()
    }

    fn udp_frame(payload: &[u8]) -> Vec<u8> {
        let ip = Ipv4Header::new(protocol::UDP, CLIENT, SERVER);
        let udp = UdpHeader::new(40000, 53)
            .encode(&ip.pseudo_header(), payload)
            .unwrap();
        let mut frame = ether(ether_type::IPV4);
        frame.extend_from_slice(&ip.encode(udp.len()).unwrap());
        frame.extend_from_slice(&udp);
        frame
    }

    #[test]
    fn test_udp_over_ipv4_reaches_done() {
        let packet = PacketParser::parse(udp_frame(b"query"));
        assert!(packet.is_parsed());
        let layers: Vec<Layer> = packet.layers().iter().map(Header::layer).collect();
        assert_eq!(layers, vec![Layer::Ether, Layer::Ipv4, Layer::Udp]);
        assert_eq!(&packet.payload().unwrap()[..], b"query");
        assert_eq!(packet.udp().unwrap().dst_port, 53);
        match packet.status() {
            Status::Parsed { last, payload } => {
                assert_eq!(*last, Layer::Udp);
                assert_eq!(*payload, 42..47);
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_short_buffer_fails_at_ethernet() {
        let packet = PacketParser::parse(vec![0u8; 13]);
        assert!(packet.layers().is_empty());
        assert_eq!(
            packet.failure(),
            Some((
                Layer::Ether,
                &SanityError::Truncated {
                    needed: 14,
                    available: 13
                }
            ))
        );
        assert!(packet.payload().is_none());
    }

    #[test]
    fn test_malformed_ipv4_stops_walk() {
        let mut frame = udp_frame(b"x");
        frame[14 + 10] ^= 0xFF; // IPv4 checksum
        let packet = PacketParser::parse(frame);
        assert_eq!(packet.layers().len(), 1);
        assert!(matches!(
            packet.failure(),
            Some((Layer::Ipv4, SanityError::ChecksumMismatch { .. }))
        ));
        assert!(packet.udp().is_none());
    }

    #[test]
    fn test_bad_udp_checksum_keeps_outer_layers() {
        let mut frame = udp_frame(b"query");
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        let packet = PacketParser::parse(frame);
        assert_eq!(packet.layers().len(), 2);
        assert!(matches!(
            packet.failure(),
            Some((Layer::Udp, SanityError::ChecksumMismatch { .. }))
        ));
    }

    #[test]
    fn test_link_padding_is_not_payload() {
        let mut frame = udp_frame(b"hi");
        frame.resize(60, 0);
        let packet = PacketParser::parse(frame);
        assert!(packet.is_parsed());
        assert_eq!(&packet.payload().unwrap()[..], b"hi");
    }

    #[test]
    fn test_unknown_ethertype_is_done() {
        let mut frame = ether(0x88CC);
        frame.extend_from_slice(b"lldp");
        let packet = PacketParser::parse(frame);
        assert_eq!(
            packet.status(),
            &Status::Parsed {
                last: Layer::Ether,
                payload: 14..18
            }
        );
    }

    #[test]
    fn test_unknown_ip_protocol_is_done() {
        let ip = Ipv4Header::new(47, CLIENT, SERVER);
        let mut frame = ether(ether_type::IPV4);
        frame.extend_from_slice(&ip.encode(4).unwrap());
        frame.extend_from_slice(b"gre!");
        let packet = PacketParser::parse(frame);
        assert!(packet.is_parsed());
        assert_eq!(packet.layers().len(), 2);
        assert_eq!(&packet.payload().unwrap()[..], b"gre!");
    }

    #[test]
    fn test_arp_is_terminal() {
        let arp = ArpHeader::request(MacAddr([2, 0, 0, 0, 0, 9]), CLIENT, SERVER);
        let mut frame = ether(ether_type::ARP);
        frame.extend_from_slice(&arp.to_bytes());
        let packet = PacketParser::parse(frame);
        assert!(packet.is_parsed());
        assert_eq!(packet.arp(), Some(&arp));
    }

    #[test]
    fn test_icmp6_over_ipv6() {
        let ip = Ipv6Header::new(
            protocol::ICMPV6,
            "fe80::9".parse().unwrap(),
            "fe80::5".parse().unwrap(),
        );
        let icmp = IcmpHeader::echo(128, 1, 2, Bytes::from_static(b"ping"))
            .encode(Some(&ip.pseudo_header()))
            .unwrap();
        let mut frame = ether(ether_type::IPV6);
        frame.extend_from_slice(&ip.encode(icmp.len()).unwrap());
        frame.extend_from_slice(&icmp);

        let packet = PacketParser::parse(frame);
        assert!(packet.is_parsed(), "{}", packet);
        assert!(matches!(packet.layers()[2], Header::Icmp6(_)));
        assert_eq!(&packet.icmp().unwrap().message_data[..], b"ping");
    }

    #[test]
    fn test_icmp4_echo() {
        let icmp = IcmpHeader::echo(ICMP_TYPE_ECHO_REQUEST, 9, 1, Bytes::from_static(b"abc"))
            .encode(None)
            .unwrap();
        let ip = Ipv4Header::new(protocol::ICMP, CLIENT, SERVER);
        let mut frame = ether(ether_type::IPV4);
        frame.extend_from_slice(&ip.encode(icmp.len()).unwrap());
        frame.extend_from_slice(&icmp);

        let packet = PacketParser::parse(frame);
        assert!(packet.is_parsed());
        assert!(matches!(packet.layers()[2], Header::Icmp4(_)));
        assert_eq!(packet.icmp().unwrap().message_id, 9);
    }

    #[test]
    fn test_round_trip_through_parser() {
        let frame = udp_frame(b"stable");
        let first = PacketParser::parse(frame.clone());
        let ip = first.ipv4().unwrap();
        let udp = first.udp().unwrap();
        let payload = first.payload().unwrap();

        let mut rebuilt = first.ether().unwrap().to_bytes().to_vec();
        let datagram = udp.encode(&ip.pseudo_header(), &payload).unwrap();
        rebuilt.extend_from_slice(&ip.encode(datagram.len()).unwrap());
        rebuilt.extend_from_slice(&datagram);

        let second = PacketParser::parse(rebuilt);
        assert_eq!(second.layers(), first.layers());
        assert_eq!(second.status(), first.status());
    }

    #[test]
    fn test_descriptor_display() {
        let packet = PacketParser::parse(udp_frame(b"q"));
        let text = packet.to_string();
        assert!(text.contains("UDP 40000 > 53, len 9"));
        assert!(text.starts_with("RX"));
    }
}
