//! # magring Memory Subsystem
//!
//! The memory subsystem provides:
//! - Physical frame handles and the frame allocator seam
//! - A bitmap frame allocator and a heap-backed frame arena
//! - The per-process address space: page table, bump-allocated high-water
//!   mark, and the record of shared regions mapped into it
//!
//! ## Key Principle
//!
//! A [`Frame`] is an owned handle. It is neither `Clone` nor `Copy`, so a
//! page can only go back to its allocator once, through the owner that
//! holds it.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod physical;
pub mod virtual_memory;

pub use physical::{AllocatorStats, FrameAllocator};
pub use physical::arena::FrameArena;
pub use physical::bitmap::BitmapAllocator;
pub use virtual_memory::VmRegion;
pub use virtual_memory::address_space::{AddressSpace, Reservation};

use core::fmt;
use magring_hal::{HalError, PhysAddr, PAGE_SIZE};

/// Memory subsystem result type
pub type MemResult<T> = Result<T, MemError>;

/// Memory subsystem errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    /// No free frame left
    OutOfMemory,
    /// Zero-sized or overflowing request
    InvalidSize,
    /// Address outside the allocator's range or not page aligned
    InvalidAddress,
    /// Reservation would pass the top of user memory
    AddressSpaceExhausted,
    /// Region overlaps an existing region
    AlreadyMapped,
    /// No region starts at the given address
    NotMapped,
    /// Frame was already free
    DoubleFree,
    /// Page-table operation failed
    Map(HalError),
}

impl From<HalError> for MemError {
    fn from(e: HalError) -> Self {
        MemError::Map(e)
    }
}

impl fmt::Display for MemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemError::OutOfMemory => f.write_str("out of physical frames"),
            MemError::InvalidSize => f.write_str("invalid size"),
            MemError::InvalidAddress => f.write_str("invalid frame address"),
            MemError::AddressSpaceExhausted => f.write_str("user address space exhausted"),
            MemError::AlreadyMapped => f.write_str("region overlaps an existing region"),
            MemError::NotMapped => f.write_str("no such region"),
            MemError::DoubleFree => f.write_str("frame freed twice"),
            MemError::Map(e) => write!(f, "page table: {}", e),
        }
    }
}

impl core::error::Error for MemError {}

/// Owned handle to one physical page
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    /// Physical address of the frame
    address: PhysAddr,
}

impl Frame {
    /// Wrap a page the caller has just taken out of an allocator
    pub const fn new(address: PhysAddr) -> Self {
        Self { address }
    }

    /// Get the physical address
    pub fn address(&self) -> PhysAddr {
        self.address
    }

    /// Fill the page with zeroes.
    ///
    /// # Safety
    /// The frame must be backed by memory reachable through the kernel's
    /// direct map, and nobody else may be accessing it.
    pub unsafe fn zero(&self) {
        // SAFETY: the caller guarantees the page is mapped and unshared.
        unsafe { core::ptr::write_bytes(self.address.as_kernel_ptr::<u8>(), 0, PAGE_SIZE) }
    }
}
