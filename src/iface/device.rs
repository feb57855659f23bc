//! Link devices exchanging whole Ethernet frames

use std::collections::VecDeque;
use std::io;

use tun_tap::Iface;

/// A link device the interface reads frames from and writes frames to
pub trait Device {
    /// Put one complete frame on the link
    fn transmit(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Read one complete frame into `buf`, returning its length.
    ///
    /// Non-blocking devices report an empty link as `WouldBlock`.
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// TAP device; the interface must be opened with `Mode::Tap` so frames keep
/// their Ethernet header
impl Device for Iface {
    fn transmit(&mut self, frame: &[u8]) -> io::Result<()> {
        self.send(frame).map(|_| ())
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf)
    }
}

/// In-memory device: frames are injected by hand and transmitted frames are
/// kept for inspection
#[derive(Debug, Default)]
pub struct Loopback {
    rx: VecDeque<Vec<u8>>,
    tx: Vec<Vec<u8>>,
}

impl Loopback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame to be returned by the next `receive`
    pub fn inject(&mut self, frame: impl Into<Vec<u8>>) {
        self.rx.push_back(frame.into());
    }

    /// Frames transmitted so far, oldest first
    pub fn transmitted(&self) -> &[Vec<u8>] {
        &self.tx
    }

    pub fn take_transmitted(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.tx)
    }

    /// Feed every transmitted frame back to the receive side
    pub fn reflect(&mut self) {
        let frames = self.take_transmitted();
        self.rx.extend(frames);
    }
}

impl Device for Loopback {
    fn transmit(&mut self, frame: &[u8]) -> io::Result<()> {
        self.tx.push(frame.to_vec());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let frame = match self.rx.pop_front() {
            Some(frame) => frame,
            None => return Err(io::ErrorKind::WouldBlock.into()),
        };
        if frame.len() > buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame of {} bytes exceeds buffer of {}", frame.len(), buf.len()),
            ));
        }
        buf[..frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }
}
