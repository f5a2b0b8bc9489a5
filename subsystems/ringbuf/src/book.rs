//! # Bookkeeping Page
//!
//! The only state producer and consumer share besides the data itself:
//! two cumulative byte counters. They only ever grow. Positions inside the
//! buffer are derived from them modulo the capacity, so a full ring and an
//! empty ring are never confused.
//!
//! Every access is a `SeqCst` atomic. The producer's data stores happen
//! before its `write_done` store, and the consumer's `write_done` load
//! happens before its data loads; that pairing is what makes the bytes
//! visible. Nothing here locks.

use core::sync::atomic::{AtomicU64, Ordering};
use magring_hal::PAGE_SIZE;
use static_assertions::{assert_eq_size, const_assert};

/// Layout of the bookkeeping page
#[derive(Debug)]
#[repr(C)]
pub struct Bookkeeping {
    /// Bytes consumed so far; written only by the consumer
    read_done: AtomicU64,
    /// Bytes produced so far; written only by the producer
    write_done: AtomicU64,
}

assert_eq_size!(Bookkeeping, [u64; 2]);
const_assert!(core::mem::size_of::<Bookkeeping>() <= PAGE_SIZE);
const_assert!(core::mem::align_of::<Bookkeeping>() <= PAGE_SIZE);

impl Bookkeeping {
    /// Counters starting at `baseline`
    pub const fn new(baseline: u64) -> Self {
        Self {
            read_done: AtomicU64::new(baseline),
            write_done: AtomicU64::new(baseline),
        }
    }

    /// Put both counters back to `baseline`.
    ///
    /// Only valid while nobody else can see the page.
    pub fn reset(&self, baseline: u64) {
        self.read_done.store(baseline, Ordering::SeqCst);
        self.write_done.store(baseline, Ordering::SeqCst);
    }

    /// Bytes consumed so far
    #[inline]
    pub fn read_done(&self) -> u64 {
        self.read_done.load(Ordering::SeqCst)
    }

    /// Bytes produced so far
    #[inline]
    pub fn write_done(&self) -> u64 {
        self.write_done.load(Ordering::SeqCst)
    }

    /// Publish `bytes` more consumed bytes. Consumer only.
    #[inline]
    pub fn advance_read(&self, bytes: u64) {
        let next = self.read_done() + bytes;
        self.read_done.store(next, Ordering::SeqCst);
    }

    /// Publish `bytes` more produced bytes. Producer only.
    #[inline]
    pub fn advance_write(&self, bytes: u64) {
        let next = self.write_done() + bytes;
        self.write_done.store(next, Ordering::SeqCst);
    }

    /// Bytes written but not yet read, as seen by a third party.
    ///
    /// `read_done` is loaded first so the difference cannot go negative;
    /// it may overstate the fill level by whatever was consumed in between.
    pub fn in_flight(&self) -> u64 {
        let read = self.read_done();
        self.write_done().saturating_sub(read)
    }
}

impl Default for Bookkeeping {
    fn default() -> Self {
        Self::new(crate::config::BOOKKEEPING_BASELINE)
    }
}
