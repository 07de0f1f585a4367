//! Atomic "current destination" cell for a forwarder
//!
//! Written only by the restart step, read once per accepted connection.
//! Connections that already dialed keep their own copy of the port, so a
//! store never reaches an established relay.

use std::sync::atomic::{AtomicU16, Ordering};

/// Current destination port; 0 means no child has been assigned yet
#[derive(Debug, Default)]
pub struct DestinationPort(AtomicU16);

impl DestinationPort {
    pub fn new() -> Self {
        Self(AtomicU16::new(0))
    }

    /// Read the destination for a new dial
    pub fn load(&self) -> Option<u16> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            port => Some(port),
        }
    }

    pub fn store(&self, port: u16) {
        self.0.store(port, Ordering::Release);
    }
}
