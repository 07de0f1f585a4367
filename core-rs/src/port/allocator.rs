/**
 * allocator.rs
 * Cyclic destination port allocation shared by every forwarder
 *
 * One cursor walks the range [start, end) and wraps back to start:
 * - Range [50000, 50003): 50000, 50001, 50002, 50000, ...
 * - Every forwarder draws from the same sequence, so two forwarders
 *   rotated during one restart never receive the same port unless the
 *   range holds a single port.
 *
 * Rotating on each restart keeps a new child off the port its predecessor
 * was bound to while that socket lingers in TIME_WAIT.
 */

use std::sync::Mutex;

use crate::errors::{RebindError, Result};

/// Destination port range (end exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Create a validated range
    ///
    /// # Errors
    /// Returns error if the range is empty or starts at port 0
    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start == 0 || start >= end {
            return Err(RebindError::InvalidPortRange { min: start, max: end });
        }
        Ok(PortRange { start, end })
    }

    /// Number of ports in the range
    pub fn len(&self) -> usize {
        usize::from(self.end.saturating_sub(self.start))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if port is within this range
    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port < self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        PortRange {
            start: 50000,
            end: 60000,
        }
    }
}

/// Allocator cursor. `None` until the first port has been issued.
#[derive(Debug)]
struct Cursor {
    last: Option<u16>,
}

/// Port Allocator - issues destination ports in one global cycle
#[derive(Debug)]
pub struct PortAllocator {
    range: PortRange,
    cursor: Mutex<Cursor>,
}

impl PortAllocator {
    /// Create an allocator over a validated range
    pub fn new(range: PortRange) -> Self {
        PortAllocator {
            range,
            cursor: Mutex::new(Cursor { last: None }),
        }
    }

    /// Advance the cursor and return the new port
    ///
    /// The first call returns `range.start`; after `range.end - 1` the
    /// cursor wraps back to `range.start`.
    pub fn cycle(&self) -> u16 {
        // Cursor is always in range, even after a panicking holder.
        let mut cursor = self
            .cursor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let next = match cursor.last {
            Some(port) if port.saturating_add(1) < self.range.end => port + 1,
            _ => self.range.start,
        };
        cursor.last = Some(next);
        next
    }

    /// Last port issued, if any
    pub fn peek(&self) -> Option<u16> {
        self.cursor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last
    }

    pub fn range(&self) -> PortRange {
        self.range
    }
}
