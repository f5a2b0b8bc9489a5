//! # magring HAL - Hardware Abstraction Layer
//!
//! The part of the machine the ring-buffer subsystem needs to see:
//! physical and virtual addresses, the base page size, and the page-table
//! seam through which shared pages are installed into a process.
//!
//! ## Design Philosophy
//!
//! The HAL only names things. Walking real page tables is the job of the
//! architecture port behind [`mmu::PageTable`]; the `soft` feature provides
//! a software table so the rest of the workspace can run on a development
//! host.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

#[cfg(any(test, feature = "soft"))]
extern crate alloc;

pub mod mmu;

#[cfg(any(test, feature = "soft"))]
pub mod soft;

use core::fmt;
use static_assertions::const_assert;

/// Size of a base page in bytes
pub const PAGE_SIZE: usize = 4096;

/// log2 of [`PAGE_SIZE`]
pub const PAGE_SHIFT: u32 = 12;

const_assert!(PAGE_SIZE == 1 << PAGE_SHIFT);

/// Result type for HAL operations
pub type HalResult<T> = Result<T, HalError>;

/// Errors reported by page-table operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// Address is not page aligned
    InvalidAddress,
    /// The virtual page already has a leaf mapping
    AlreadyMapped,
    /// The virtual page has no leaf mapping
    NotMapped,
    /// An intermediate page-table page could not be allocated
    OutOfMemory,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalError::InvalidAddress => f.write_str("address is not page aligned"),
            HalError::AlreadyMapped => f.write_str("page already mapped"),
            HalError::NotMapped => f.write_str("page not mapped"),
            HalError::OutOfMemory => f.write_str("out of page-table memory"),
        }
    }
}

impl core::error::Error for HalError {}

/// Physical address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(u64);

impl PhysAddr {
    /// Create a new physical address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Get the raw address value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check page alignment
    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.0 % PAGE_SIZE as u64 == 0
    }

    /// Add a byte offset
    #[inline]
    pub const fn add(self, offset: u64) -> Self {
        Self(self.0 + offset)
    }

    /// Kernel pointer to this physical address.
    ///
    /// The kernel maps all of physical memory one-to-one, so the pointer
    /// value equals the address.
    #[inline]
    pub const fn as_kernel_ptr<T>(self) -> *mut T {
        self.0 as usize as *mut T
    }
}

impl fmt::LowerHex for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Virtual address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(u64);

impl VirtAddr {
    /// Create a new virtual address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Get the raw address value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check page alignment
    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.0 % PAGE_SIZE as u64 == 0
    }

    /// Round up to the next page boundary
    #[inline]
    pub const fn page_align_up(self) -> Self {
        let mask = PAGE_SIZE as u64 - 1;
        Self((self.0 + mask) & !mask)
    }

    /// Round down to the containing page boundary
    #[inline]
    pub const fn page_align_down(self) -> Self {
        Self(self.0 & !(PAGE_SIZE as u64 - 1))
    }

    /// Offset within the containing page
    #[inline]
    pub const fn page_offset(self) -> usize {
        (self.0 % PAGE_SIZE as u64) as usize
    }

    /// Virtual page number
    #[inline]
    pub const fn page_number(self) -> u64 {
        self.0 >> PAGE_SHIFT
    }

    /// Add a byte offset
    #[inline]
    pub const fn add(self, offset: u64) -> Self {
        Self(self.0 + offset)
    }

    /// Address `pages` whole pages further on
    #[inline]
    pub const fn add_pages(self, pages: usize) -> Self {
        Self(self.0 + (pages as u64) * PAGE_SIZE as u64)
    }

    /// Convert to a raw pointer
    #[inline]
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as usize as *const T
    }

    /// Convert to a raw mutable pointer
    #[inline]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as usize as *mut T
    }
}

impl fmt::LowerHex for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
