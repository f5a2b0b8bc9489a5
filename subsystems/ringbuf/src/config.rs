//! # Ring Configuration
//!
//! Fixed sizes of the ring subsystem. Every ring has the same shape, so
//! these are compile-time constants rather than per-ring parameters.

use magring_hal::PAGE_SIZE;
use static_assertions::const_assert;

/// Maximum number of rings live at the same time
pub const MAX_RINGS: usize = 10;

/// Data pages per ring
pub const RING_PAGES: usize = 16;

/// Bytes of a ring name that are significant; longer names are truncated
pub const RING_NAME_LEN: usize = 16;

/// Data capacity of a ring in bytes
pub const RING_CAPACITY: usize = RING_PAGES * PAGE_SIZE;

/// Pages a ring occupies in a process: the data pages, then the
/// bookkeeping page
pub const RING_REGION_PAGES: usize = RING_PAGES + 1;

/// Value both counters hold when a ring is created
pub const BOOKKEEPING_BASELINE: u64 = 0;

const_assert!(MAX_RINGS > 0);
const_assert!(RING_PAGES > 0);
const_assert!(RING_NAME_LEN > 0);
const_assert!((RING_CAPACITY as u64) < u64::MAX / 2);
