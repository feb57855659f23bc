//! Transport layer protocols implementation
//!
//! This module contains header codecs for transport layer protocols:
//! - UDP: User Datagram Protocol
//! - TCP: Transmission Control Protocol (segment format only)

pub mod tcp;
pub mod udp;

// Re-export commonly used items
pub use tcp::TcpHeader;
pub use udp::UdpHeader;
