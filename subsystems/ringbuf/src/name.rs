//! # Ring Names
//!
//! Names arrive from user space as C strings. Only the first
//! [`RING_NAME_LEN`] bytes are kept, so a stored name is not necessarily
//! NUL-terminated and two long names with a common prefix meet on the same
//! ring.

use crate::config::RING_NAME_LEN;
use arrayvec::ArrayVec;
use core::fmt;

/// Bounded ring name
#[derive(Clone, PartialEq, Eq, Default)]
pub struct RingName {
    bytes: ArrayVec<u8, RING_NAME_LEN>,
}

impl RingName {
    /// The empty name, usable in constants
    pub const fn empty() -> Self {
        Self {
            bytes: ArrayVec::new_const(),
        }
    }

    /// Build a name from raw bytes.
    ///
    /// Stops at the first NUL and silently drops whatever does not fit.
    pub fn new(raw: &[u8]) -> Self {
        let mut bytes = ArrayVec::new();
        for &b in raw.iter().take_while(|&&b| b != 0).take(RING_NAME_LEN) {
            bytes.push(b);
        }
        Self { bytes }
    }

    /// Stored bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check for the empty name
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&str> for RingName {
    fn from(name: &str) -> Self {
        Self::new(name.as_bytes())
    }
}

impl fmt::Display for RingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.as_bytes() {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for RingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RingName(\"{}\")", self)
    }
}
