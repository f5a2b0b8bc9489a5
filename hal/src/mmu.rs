//! # MMU Abstraction
//!
//! Leaf permission bits and the page-table trait the memory subsystem maps
//! through.

use crate::{HalResult, PhysAddr, VirtAddr};
use bitflags::bitflags;

bitflags! {
    /// Leaf page-table entry flags (Sv39 bit layout)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u64 {
        /// Entry is valid
        const VALID = 1 << 0;
        /// Page is readable
        const READ = 1 << 1;
        /// Page is writable
        const WRITE = 1 << 2;
        /// Page is executable
        const EXECUTE = 1 << 3;
        /// Page is accessible from user mode
        const USER = 1 << 4;
        /// Mapping is global (present in every address space)
        const GLOBAL = 1 << 5;
        /// Page has been accessed
        const ACCESSED = 1 << 6;
        /// Page has been written to
        const DIRTY = 1 << 7;
    }
}

impl PteFlags {
    /// Read-write data visible to user mode
    pub const fn user_data() -> Self {
        Self::READ.union(Self::WRITE).union(Self::USER)
    }
}

/// Page table of one address space.
///
/// Implementations install and remove leaf mappings only. They never own
/// the frames they point at: freeing a frame is always the caller's call.
pub trait PageTable {
    /// Map one page at `va` to the frame at `pa`.
    ///
    /// Both addresses must be page aligned. Fails without side effects if
    /// the page is already mapped or an intermediate table cannot be
    /// allocated.
    fn map(&mut self, va: VirtAddr, pa: PhysAddr, flags: PteFlags) -> HalResult<()>;

    /// Remove `count` consecutive leaf mappings starting at `va`.
    ///
    /// Pages without a mapping are skipped.
    fn unmap(&mut self, va: VirtAddr, count: usize);

    /// Frame and flags backing the page that contains `va`
    fn query(&self, va: VirtAddr) -> Option<(PhysAddr, PteFlags)>;

    /// Translate a virtual address to the physical address it reaches
    fn translate(&self, va: VirtAddr) -> Option<PhysAddr> {
        self.query(va)
            .map(|(frame, _)| frame.add(va.page_offset() as u64))
    }

    /// Check if the page containing `va` is mapped
    fn is_mapped(&self, va: VirtAddr) -> bool {
        self.query(va).is_some()
    }
}
