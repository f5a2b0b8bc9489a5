//! # magring - Shared-Memory Ring Buffers
//!
//! A zero-copy alternative to pipes. Two processes name the same ring; the
//! kernel maps the same physical pages into both of them and steps out of
//! the way. Producer and consumer then agree on progress through two
//! counters on a shared bookkeeping page.
//!
//! ## Architecture
//!
//! ```text
//!   process A                      kernel                      process B
//!  ┌──────────┐   ring(name,1)  ┌─────────────┐  ring(name,1)  ┌──────────┐
//!  │ handle   │ ──────────────> │ RingRegistry│ <───────────── │ handle   │
//!  │ table    │                 │  [RingSlot] │                │ table    │
//!  └────┬─────┘                 └──────┬──────┘                └────┬─────┘
//!       │ base                         │ frames                     │ base
//!       ▼                              ▼                            ▼
//!  ┌──────────────────────┬──────┐          ┌──────────────────────┬──────┐
//!  │ data pages (16)      │ book │  ==same  │ data pages (16)      │ book │
//!  └──────────────────────┴──────┘  frames  └──────────────────────┴──────┘
//! ```
//!
//! - [`registry`]: the slot table, its lock, and reference counting
//! - [`mapper`]: projects a slot's frames into a caller's address space
//! - [`book`]: the bookkeeping page format shared with user space
//! - [`syscall`]: the `ring` system call
//!
//! The counters are never touched by the kernel after creation; the
//! steady-state path is entirely in user space.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

#[cfg(any(test, feature = "host"))]
extern crate alloc;

pub mod book;
pub mod config;
pub mod mapper;
pub mod name;
pub mod registry;
pub mod slot;
pub mod syscall;

#[cfg(any(test, feature = "host"))]
pub mod host;

pub use book::Bookkeeping;
pub use config::{MAX_RINGS, RING_CAPACITY, RING_NAME_LEN, RING_PAGES, RING_REGION_PAGES};
pub use name::RingName;
pub use registry::{Attached, Detached, RingRegistry, SlotId};
pub use slot::{RingFrames, RingSlot};
pub use syscall::{ring, sys_ring, RingMode};

use core::fmt;

/// Ring subsystem result type
pub type RingResult<T> = Result<T, RingError>;

/// Ring subsystem errors.
///
/// None of these are retried: each reflects a condition that only another
/// process's detach can clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// Every slot is live and none carries the requested name
    NoFreeSlot,
    /// A data or bookkeeping page could not be allocated
    OutOfMemory,
    /// The ring could not be mapped into the caller
    MapFailed,
    /// No live ring carries the requested name
    NotFound,
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::NoFreeSlot => f.write_str("ring table is full"),
            RingError::OutOfMemory => f.write_str("out of memory for ring pages"),
            RingError::MapFailed => f.write_str("could not map ring into caller"),
            RingError::NotFound => f.write_str("no such ring"),
        }
    }
}

impl core::error::Error for RingError {}
