//! # Virtual Memory Management
//!
//! Process address spaces and the regions recorded in them.

pub mod address_space;

use magring_hal::mmu::PteFlags;
use magring_hal::VirtAddr;

/// Shared region mapped into an address space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRegion {
    /// Start address
    pub start: VirtAddr,
    /// Size in pages
    pub pages: usize,
    /// Leaf permissions
    pub flags: PteFlags,
    /// Identifier of the shared object backing the region
    pub object: usize,
}

impl VmRegion {
    /// Get end address
    pub fn end(&self) -> VirtAddr {
        self.start.add_pages(self.pages)
    }

    /// Check if contains address
    pub fn contains(&self, addr: VirtAddr) -> bool {
        addr >= self.start && addr < self.end()
    }

    /// Check if overlaps with another region
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end() && other.start < self.end()
    }
}
