//! # Software Page Table
//!
//! A [`PageTable`] kept in an ordered map instead of hardware tables. Hosts
//! use it to run the memory and ring subsystems without an MMU; tests use
//! its failpoint to make a chosen `map` call fail.

use crate::mmu::{PageTable, PteFlags};
use crate::{HalError, HalResult, PhysAddr, VirtAddr};
use alloc::collections::BTreeMap;

/// Software page table
#[derive(Debug, Default)]
pub struct SoftPageTable {
    /// Virtual page number -> (frame, flags)
    entries: BTreeMap<u64, (PhysAddr, PteFlags)>,
    /// Successful maps left before the armed failure
    fail_after: Option<usize>,
}

impl SoftPageTable {
    /// Create an empty table
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            fail_after: None,
        }
    }

    /// Let the next `successes` calls to [`PageTable::map`] succeed and
    /// fail the one after. The failpoint disarms once it fires.
    pub fn fail_map_after(&mut self, successes: usize) {
        self.fail_after = Some(successes);
    }

    /// Number of mapped pages
    pub fn mapped_pages(&self) -> usize {
        self.entries.len()
    }

    fn take_failpoint(&mut self) -> bool {
        match self.fail_after {
            Some(0) => {
                self.fail_after = None;
                true
            }
            Some(n) => {
                self.fail_after = Some(n - 1);
                false
            }
            None => false,
        }
    }
}

impl PageTable for SoftPageTable {
    fn map(&mut self, va: VirtAddr, pa: PhysAddr, flags: PteFlags) -> HalResult<()> {
        if !va.is_page_aligned() || !pa.is_page_aligned() {
            return Err(HalError::InvalidAddress);
        }
        if self.entries.contains_key(&va.page_number()) {
            return Err(HalError::AlreadyMapped);
        }
        if self.take_failpoint() {
            log::trace!("soft: injected map failure at {:#x}", va);
            return Err(HalError::OutOfMemory);
        }

        log::trace!("soft: map {:#x} -> {:#x} {:?}", va, pa, flags);
        self.entries.insert(va.page_number(), (pa, flags | PteFlags::VALID));
        Ok(())
    }

    fn unmap(&mut self, va: VirtAddr, count: usize) {
        let first = va.page_number();
        for vpn in first..first + count as u64 {
            if self.entries.remove(&vpn).is_some() {
                log::trace!("soft: unmap vpn {:#x}", vpn);
            }
        }
    }

    fn query(&self, va: VirtAddr) -> Option<(PhysAddr, PteFlags)> {
        self.entries.get(&va.page_number()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_and_translate() {
        let mut table = SoftPageTable::new();
        table
            .map(VirtAddr::new(0x4000), PhysAddr::new(0x8000_0000), PteFlags::user_data())
            .unwrap();

        assert_eq!(table.translate(VirtAddr::new(0x4010)), Some(PhysAddr::new(0x8000_0010)));
        let (_, flags) = table.query(VirtAddr::new(0x4000)).unwrap();
        assert!(flags.contains(PteFlags::VALID | PteFlags::USER | PteFlags::WRITE));
        assert!(!table.is_mapped(VirtAddr::new(0x5000)));
    }

    #[test]
    fn test_rejects_remap_and_unaligned() {
        let mut table = SoftPageTable::new();
        let flags = PteFlags::user_data();
        table.map(VirtAddr::new(0x1000), PhysAddr::new(0x2000), flags).unwrap();

        assert_eq!(
            table.map(VirtAddr::new(0x1000), PhysAddr::new(0x3000), flags),
            Err(HalError::AlreadyMapped)
        );
        assert_eq!(
            table.map(VirtAddr::new(0x1800), PhysAddr::new(0x3000), flags),
            Err(HalError::InvalidAddress)
        );
    }

    #[test]
    fn test_failpoint_fires_once() {
        let mut table = SoftPageTable::new();
        let flags = PteFlags::user_data();
        table.fail_map_after(1);

        assert!(table.map(VirtAddr::new(0x1000), PhysAddr::new(0x1000), flags).is_ok());
        assert_eq!(
            table.map(VirtAddr::new(0x2000), PhysAddr::new(0x2000), flags),
            Err(HalError::OutOfMemory)
        );
        assert!(table.map(VirtAddr::new(0x2000), PhysAddr::new(0x2000), flags).is_ok());
        assert_eq!(table.mapped_pages(), 2);
    }

    #[test]
    fn test_unmap_skips_holes() {
        let mut table = SoftPageTable::new();
        let flags = PteFlags::user_data();
        table.map(VirtAddr::new(0x1000), PhysAddr::new(0x1000), flags).unwrap();
        table.map(VirtAddr::new(0x3000), PhysAddr::new(0x3000), flags).unwrap();

        table.unmap(VirtAddr::new(0x1000), 3);
        assert_eq!(table.mapped_pages(), 0);
    }
}
