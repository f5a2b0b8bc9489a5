//! # magring User Library
//!
//! What a process links against to use rings:
//! - [`RingTable`]: the per-process handle table, `attach`/`detach` by name
//! - [`Ring`]: the flow-control view of one attached ring
//! - [`RingSys`]: the seam to the kernel's `ring` system call
//!
//! ## Flow Control
//!
//! ```text
//!   producer                                           consumer
//!   begin_write ─> (addr, n) ─> fill ─> finish_write(k)
//!                                          │ write_done += k
//!                                          ▼
//!                                   ┌──────────────┐
//!                                   │ bookkeeping  │
//!                                   └──────────────┘
//!                                          │
//!   finish_read(k) <─ drain <─ (addr, n) <─ begin_read
//!   read_done += k
//! ```
//!
//! None of the flow-control calls enter the kernel or block. A caller that
//! gets a zero-length span polls again.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod ring;
pub mod sys;
pub mod table;

pub use ring::{FlowError, Ring, Span};
pub use sys::RingSys;
pub use table::{RingDesc, RingTable, MAX_LOCAL_RINGS};

use core::fmt;

/// User library result type
pub type UserResult<T> = Result<T, UserError>;

/// User library errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserError {
    /// Every local handle is in use
    NoLocalSlots,
    /// The handle does not name an attached ring
    NotAttached,
    /// The `ring` system call returned -1
    Syscall,
    /// A ring address did not resolve to memory
    BadAddress,
    /// A finish call claimed more than was available
    Flow(FlowError),
}

impl From<FlowError> for UserError {
    fn from(e: FlowError) -> Self {
        UserError::Flow(e)
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserError::NoLocalSlots => f.write_str("no free ring handle"),
            UserError::NotAttached => f.write_str("ring handle not attached"),
            UserError::Syscall => f.write_str("ring system call failed"),
            UserError::BadAddress => f.write_str("ring address not mapped"),
            UserError::Flow(e) => write!(f, "{}", e),
        }
    }
}

impl core::error::Error for UserError {}
