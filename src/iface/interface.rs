//! Network interface and packet processing
//!
//! This module drives one link device:
//! - inbound frames are parsed, filtered by destination and demultiplexed
//! - ARP requests for our address and ICMP echo requests are answered here
//! - datagrams queued by sockets are built into frames and transmitted

use std::io;
use std::net::IpAddr;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::device::Device;
use super::neighbor::NeighborTable;
use crate::config::StackConfig;
use crate::error::{Result, StackError};
use crate::link::{ArpHeader, ArpOperation, MacAddr};
use crate::network::icmp::{
    ICMP6_TYPE_ECHO_REPLY, ICMP6_TYPE_ECHO_REQUEST, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST,
};
use crate::network::IcmpHeader;
use crate::packet::{Header, PacketBuilder, PacketDescriptor, PacketParser};
use crate::socket::{Endpoint, OutgoingPacketRequest, SocketRegistry, TransportProtocol};

/// Largest frame read from the device: 1500 bytes of MTU plus Ethernet
/// header and VLAN tag
pub const MAX_FRAME_LEN: usize = 1518;

/// Network interface bound to one link device
pub struct NetworkInterface<D: Device> {
    config: StackConfig,
    device: D,
    registry: Arc<SocketRegistry>,
    outbound: Receiver<OutgoingPacketRequest>,
    neighbors: NeighborTable,
}

impl<D: Device> NetworkInterface<D> {
    /// Create an interface with an empty socket registry
    pub fn new(config: StackConfig, device: D) -> Self {
        let (sender, outbound) = mpsc::channel();
        info!(
            "Interface up: {} {}/{} {}",
            config.mac,
            config.ipv4,
            config.netmask,
            config
                .ipv6
                .map(|v6| v6.to_string())
                .unwrap_or_default()
        );
        NetworkInterface {
            config,
            device,
            registry: SocketRegistry::new(sender),
            outbound,
            neighbors: NeighborTable::new(),
        }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Socket registry served by this interface
    pub fn registry(&self) -> &Arc<SocketRegistry> {
        &self.registry
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    /// Read and process at most one frame, then flush queued datagrams.
    ///
    /// Returns whether a frame was read; an idle non-blocking device is not
    /// an error.
    pub fn poll(&mut self) -> Result<bool> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let received = match self.device.receive(&mut buf) {
            Ok(len) => {
                self.process_frame(Bytes::copy_from_slice(&buf[..len]));
                true
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => false,
            Err(e) => return Err(e.into()),
        };
        self.flush();
        Ok(received)
    }

    /// Handle one inbound frame and return its descriptor
    pub fn process_frame(&mut self, frame: Bytes) -> PacketDescriptor {
        let packet = PacketParser::parse(frame);
        if !packet.is_parsed() {
            return packet;
        }
        debug!("{}", packet);

        let ether = match packet.ether() {
            Some(ether) => *ether,
            None => return packet,
        };
        if ether.dst != self.config.mac && !ether.dst.is_multicast() {
            debug!("{} - Frame for {} is not for us", packet.tracker(), ether.dst);
            return packet;
        }

        if let Some((src, dst)) = packet.ip_addrs() {
            self.neighbors.learn(src, ether.src);
            if !self.config.is_for_us(&dst) {
                debug!("{} - Packet for {} is not for us", packet.tracker(), dst);
                return packet;
            }
        }

        let result = match packet.layers().last() {
            Some(Header::Arp(arp)) => self.handle_arp(&packet, arp),
            Some(Header::Icmp4(icmp)) | Some(Header::Icmp6(icmp)) => {
                self.handle_icmp(&packet, ether.src, icmp)
            }
            Some(Header::Udp(udp)) => {
                self.deliver(&packet, TransportProtocol::Udp, udp.src_port, udp.dst_port);
                Ok(())
            }
            Some(Header::Tcp(tcp)) => {
                self.deliver(&packet, TransportProtocol::Tcp, tcp.src_port, tcp.dst_port);
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            warn!("{} - Reply failed: {}", packet.tracker(), e);
        }
        packet
    }

    /// Answer requests for our IPv4 address and learn the sender
    fn handle_arp(&mut self, packet: &PacketDescriptor, arp: &ArpHeader) -> Result<()> {
        self.neighbors
            .learn(IpAddr::V4(arp.sender_proto_addr), arp.sender_hw_addr);

        if arp.op() != Some(ArpOperation::Request) || arp.target_proto_addr != self.config.ipv4 {
            return Ok(());
        }

        let reply = ArpHeader::reply_to(arp, self.config.mac);
        let frame = PacketBuilder::new(self.config.mac, arp.sender_hw_addr)
            .in_reply_to(packet.tracker())
            .arp(&reply);
        info!(
            "{} - Sent ARP reply {} is at {}",
            frame.tracker(),
            reply.sender_proto_addr,
            reply.sender_hw_addr
        );
        self.transmit(&frame)
    }

    /// Echo requests get a reply carrying the same id, sequence and data
    fn handle_icmp(
        &mut self,
        packet: &PacketDescriptor,
        peer_mac: MacAddr,
        icmp: &IcmpHeader,
    ) -> Result<()> {
        let reply_type = match (icmp.icmp_type, packet.ipv4().is_some()) {
            (ICMP_TYPE_ECHO_REQUEST, true) => ICMP_TYPE_ECHO_REPLY,
            (ICMP6_TYPE_ECHO_REQUEST, false) => ICMP6_TYPE_ECHO_REPLY,
            (icmp_type, _) => {
                debug!("{} - Ignoring ICMP type {}", packet.tracker(), icmp_type);
                return Ok(());
            }
        };
        let (remote, _) = packet
            .ip_addrs()
            .ok_or_else(|| StackError::invalid_header("ICMP without IP layer"))?;
        let local = self
            .config
            .source_for(&remote)
            .ok_or(StackError::Unsupported("IPv6 without a configured address"))?;

        let reply = IcmpHeader::echo(
            reply_type,
            icmp.message_id,
            icmp.message_seq,
            icmp.message_data.clone(),
        );
        let frame = self
            .builder(peer_mac)
            .in_reply_to(packet.tracker())
            .icmp(local, remote, &reply)?;
        info!(
            "{} - Sent ICMP echo reply to {}, id {}, seq {}",
            frame.tracker(),
            remote,
            reply.message_id,
            reply.message_seq
        );
        self.transmit(&frame)
    }

    /// Hand a transport payload to the socket registry
    fn deliver(&self, packet: &PacketDescriptor, protocol: TransportProtocol, src_port: u16, dst_port: u16) {
        let ((src, dst), payload) = match (packet.ip_addrs(), packet.payload()) {
            (Some(addrs), Some(payload)) => (addrs, payload),
            _ => return,
        };
        let delivered = self.registry.dispatch(
            protocol,
            Endpoint::new(dst, dst_port),
            Endpoint::new(src, src_port),
            payload,
            *packet.tracker(),
        );
        if !delivered {
            debug!("{} - Dropped {} datagram for port {}", packet.tracker(), protocol, dst_port);
        }
    }

    /// Transmit every datagram queued by sockets; returns how many were sent
    pub fn flush(&mut self) -> usize {
        let mut sent = 0;
        loop {
            let request = match self.outbound.try_recv() {
                Ok(request) => request,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            match self.send_request(&request) {
                Ok(()) => sent += 1,
                Err(e) => warn!(
                    "Dropped {} datagram {} > {}: {}",
                    request.protocol, request.local, request.remote, e
                ),
            }
        }
        sent
    }

    /// Build and transmit one socket datagram
    pub fn send_request(&mut self, request: &OutgoingPacketRequest) -> Result<()> {
        if request.protocol != TransportProtocol::Udp {
            return Err(StackError::Unsupported("sending on TCP sockets"));
        }
        let remote = request.remote;
        let local_addr = if request.local.addr.is_unspecified() {
            self.config
                .source_for(&remote.addr)
                .ok_or(StackError::Unsupported("IPv6 without a configured address"))?
        } else {
            request.local.addr
        };

        let dst_mac = match remote.addr {
            IpAddr::V4(v4) if self.config.is_broadcast(&v4) => MacAddr::BROADCAST,
            addr => self.neighbors.resolve(&addr)?,
        };

        let mut builder = self.builder(dst_mac);
        if let Some(parent) = &request.parent {
            builder = builder.in_reply_to(parent);
        }
        let frame = builder.udp(
            (local_addr, request.local.port),
            (remote.addr, remote.port),
            &request.payload,
        )?;
        self.transmit(&frame)
    }

    /// Close every socket
    pub fn shutdown(&mut self) {
        self.registry.shutdown();
        self.flush();
    }

    fn builder(&self, dst_mac: MacAddr) -> PacketBuilder {
        PacketBuilder::new(self.config.mac, dst_mac)
            .ttl(self.config.ttl)
            .hop_limit(self.config.hop_limit)
    }

    fn transmit(&mut self, frame: &PacketDescriptor) -> Result<()> {
        debug!("{}", frame);
        self.device.transmit(frame.frame())?;
        Ok(())
    }
}
