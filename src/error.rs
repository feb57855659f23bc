//! Error types for the stack
//!
//! Decode-time problems are per-packet and described by [`SanityError`]; they
//! end up inside a packet descriptor and are never returned from the public API.
//! Everything a caller can trip over synchronously is a [`StackError`].

use std::net::IpAddr;

use thiserror::Error;

use crate::socket::SocketId;

/// Result type alias for stack operations
pub type Result<T> = std::result::Result<T, StackError>;

/// Reason a header failed its sanity check during decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanityError {
    /// Fewer bytes remain than the header needs
    #[error("truncated header: need {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// A field holds a value the protocol does not allow
    #[error("sanity check failed: {0}")]
    Structural(String),

    /// The stored checksum does not match the recomputed one
    #[error("checksum mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { stored: u16, computed: u16 },
}

impl SanityError {
    pub(crate) fn structural<S: Into<String>>(msg: S) -> Self {
        SanityError::Structural(msg.into())
    }
}

/// Errors reported to callers of the socket and builder APIs
#[derive(Error, Debug)]
pub enum StackError {
    /// Link device I/O error
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A socket with the same identity is already registered
    #[error("socket already open: {0}")]
    SocketAlreadyOpen(SocketId),

    /// The socket was closed, possibly while a caller was blocked on it
    #[error("socket closed: {0}")]
    SocketClosed(SocketId),

    /// accept() called on a socket with a concrete remote side
    #[error("socket is not listening: {0}")]
    NotListening(SocketId),

    /// send() called on a socket without a concrete remote side
    #[error("socket has no remote endpoint: {0}")]
    NotConnected(SocketId),

    /// receive_timeout() elapsed with nothing queued
    #[error("timed out waiting on socket {0}")]
    TimedOut(SocketId),

    /// Source and destination addresses belong to different IP versions
    #[error("address family mismatch: {0} / {1}")]
    AddressFamilyMismatch(IpAddr, IpAddr),

    /// A field would overflow its fixed-width wire encoding
    #[error("cannot encode {field}: {value} exceeds {max}")]
    FieldOverflow {
        field: &'static str,
        value: usize,
        max: usize,
    },

    /// A caller-built header is not encodable as given
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// No link address is known for the next hop
    #[error("no link address known for {0}")]
    UnresolvedNeighbor(IpAddr),

    /// Requested operation is not supported by this stack
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// The outbound queue has no consumer left
    #[error("outbound queue closed")]
    QueueClosed,
}

impl StackError {
    pub(crate) fn invalid_header<S: Into<String>>(msg: S) -> Self {
        StackError::InvalidHeader(msg.into())
    }
}
