//! Packet correlation trackers
//!
//! Every inbound frame and every outbound build request gets a tracker. A
//! packet sent because of another one (an echo reply, an ARP reply) records
//! the originating tracker as its parent so the two can be matched in logs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static RX_SERIAL: AtomicU64 = AtomicU64::new(0);
static TX_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Direction a tracked packet travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Rx,
    Tx,
}

/// Identity of one tracked packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackerId {
    pub direction: Direction,
    pub serial: u64,
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.direction {
            Direction::Rx => "RX",
            Direction::Tx => "TX",
        };
        write!(f, "{}{:04x}", prefix, self.serial)
    }
}

/// Correlation tag attached to a packet for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tracker {
    id: TrackerId,
    parent: Option<TrackerId>,
}

impl Tracker {
    /// Allocate a tracker for an inbound frame
    pub fn rx() -> Self {
        Self::allocate(Direction::Rx, None)
    }

    /// Allocate a tracker for an outbound packet, optionally caused by `parent`
    pub fn tx(parent: Option<&Tracker>) -> Self {
        Self::allocate(Direction::Tx, parent.map(|p| p.id))
    }

    fn allocate(direction: Direction, parent: Option<TrackerId>) -> Self {
        let counter = match direction {
            Direction::Rx => &RX_SERIAL,
            Direction::Tx => &TX_SERIAL,
        };
        let serial = counter.fetch_add(1, Ordering::Relaxed);
        Tracker {
            id: TrackerId { direction, serial },
            parent,
        }
    }

    pub fn id(&self) -> TrackerId {
        self.id
    }

    pub fn parent(&self) -> Option<TrackerId> {
        self.parent
    }
}

impl fmt::Display for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) => write!(f, "{} [echo {}]", self.id, parent),
            None => write!(f, "{}", self.id),
        }
    }
}
