//! # Flow Control
//!
//! One producer and one consumer share a ring. Each side learns how much it
//! may touch from the two counters on the bookkeeping page and publishes
//! progress by advancing its own counter:
//!
//! - writable = capacity - (write_done - read_done), at `write_done mod capacity`
//! - readable = write_done - read_done, at `read_done mod capacity`
//!
//! The ring is mapped once, so a span handed out by `begin_*` stops at the
//! end of the buffer. After finishing it, the caller gets the part that
//! wrapped to the front with another `begin_*`.
//!
//! Nothing is cached between calls; every answer is recomputed from the
//! counters.

use crate::sys::{read_user, write_user, RingSys};
use crate::UserResult;
use core::fmt;
use magring::Bookkeeping;
use magring_hal::VirtAddr;

/// A contiguous run of the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// First byte, in the caller's address space
    pub addr: VirtAddr,
    /// Bytes available from `addr`
    pub len: usize,
}

impl Span {
    /// Check for an empty span
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Flow-control errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowError {
    /// `finish_*` was asked to publish more than is available
    Overrun {
        /// Bytes the caller tried to publish
        requested: usize,
        /// Bytes available when the call was made
        available: usize,
    },
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::Overrun { requested, available } => {
                write!(f, "finish of {} bytes with only {} available", requested, available)
            }
        }
    }
}

impl core::error::Error for FlowError {}

/// Flow-control view of one attached ring
pub struct Ring<'a, S: RingSys + ?Sized> {
    sys: &'a S,
    base: VirtAddr,
    book: &'a Bookkeeping,
    capacity: usize,
}

impl<'a, S: RingSys + ?Sized> Ring<'a, S> {
    /// Build a view over `capacity` bytes at `base` governed by `book`.
    ///
    /// # Safety
    ///
    /// `sys` must resolve every address in `base..base + capacity` to
    /// memory that stays valid for `'a`, shared with at most one other
    /// party that follows the same protocol. `capacity` must be non-zero.
    pub unsafe fn from_raw(sys: &'a S, base: VirtAddr, book: &'a Bookkeeping, capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            sys,
            base,
            book,
            capacity,
        }
    }

    /// Start of the buffer
    pub fn base(&self) -> VirtAddr {
        self.base
    }

    /// Buffer size in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The shared counters
    pub fn bookkeeping(&self) -> &'a Bookkeeping {
        self.book
    }

    fn used(&self) -> usize {
        let read = self.book.read_done();
        let write = self.book.write_done();
        (write.saturating_sub(read) as usize).min(self.capacity)
    }

    fn offset(&self, counter: u64) -> usize {
        (counter % self.capacity as u64) as usize
    }

    /// Total free space, ignoring the wrap
    pub fn writable(&self) -> usize {
        self.capacity - self.used()
    }

    /// Total unread bytes, ignoring the wrap
    pub fn readable(&self) -> usize {
        self.used()
    }

    /// Where the producer may write next, and how much.
    ///
    /// The span is empty when the ring is full.
    pub fn begin_write(&self) -> Span {
        let write = self.book.write_done();
        let available = self.writable();
        let offset = self.offset(write);
        Span {
            addr: self.base.add(offset as u64),
            len: available.min(self.capacity - offset),
        }
    }

    /// Publish `bytes` written at the last span
    pub fn finish_write(&self, bytes: usize) -> Result<(), FlowError> {
        let available = self.writable();
        if bytes > available {
            return Err(FlowError::Overrun {
                requested: bytes,
                available,
            });
        }
        self.book.advance_write(bytes as u64);
        Ok(())
    }

    /// Where the consumer may read next, and how much.
    ///
    /// The span is empty when the ring is empty.
    pub fn begin_read(&self) -> Span {
        let read = self.book.read_done();
        let available = self.readable();
        let offset = self.offset(read);
        Span {
            addr: self.base.add(offset as u64),
            len: available.min(self.capacity - offset),
        }
    }

    /// Release `bytes` read from the last span back to the producer
    pub fn finish_read(&self, bytes: usize) -> Result<(), FlowError> {
        let available = self.readable();
        if bytes > available {
            return Err(FlowError::Overrun {
                requested: bytes,
                available,
            });
        }
        self.book.advance_read(bytes as u64);
        Ok(())
    }

    /// Copy as much of `data` into the ring as fits right now.
    ///
    /// Returns the number of bytes written; zero when the ring is full.
    pub fn write_bytes(&self, data: &[u8]) -> UserResult<usize> {
        let mut done = 0;
        // The second span picks up what wrapped to the front.
        for _ in 0..2 {
            let span = self.begin_write();
            let n = span.len.min(data.len() - done);
            if n == 0 {
                break;
            }
            write_user(self.sys, span.addr, &data[done..done + n])?;
            self.finish_write(n)?;
            done += n;
        }
        Ok(done)
    }

    /// Copy as many unread bytes as fit into `out`.
    ///
    /// Returns the number of bytes read; zero when the ring is empty.
    pub fn read_bytes(&self, out: &mut [u8]) -> UserResult<usize> {
        let mut done = 0;
        for _ in 0..2 {
            let span = self.begin_read();
            let n = span.len.min(out.len() - done);
            if n == 0 {
                break;
            }
            read_user(self.sys, span.addr, &mut out[done..done + n])?;
            self.finish_read(n)?;
            done += n;
        }
        Ok(done)
    }
}

impl<S: RingSys + ?Sized> fmt::Debug for Ring<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ring")
            .field("base", &self.base)
            .field("capacity", &self.capacity)
            .field("read_done", &self.book.read_done())
            .field("write_done", &self.book.write_done())
            .finish()
    }
}
