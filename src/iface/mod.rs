//! Network interface abstraction layer
//!
//! This module ties the codecs and sockets to a link device:
//! - [`device`]: whole-frame link devices (TAP, loopback)
//! - [`neighbor`]: IP to link address table
//! - [`interface`]: inbound processing, automatic replies and the outbound queue

pub mod device;
pub mod interface;
pub mod neighbor;

// Re-export commonly used items
pub use device::{Device, Loopback};
pub use interface::NetworkInterface;
pub use neighbor::NeighborTable;
