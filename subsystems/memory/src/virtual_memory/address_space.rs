//! # Address Space Management
//!
//! The memory half of a process descriptor. User memory grows upward from
//! zero; `size` is its high-water mark and new ranges are bump-allocated
//! above it. Freed ranges are never reused.

use super::VmRegion;
use crate::{MemError, MemResult};
use alloc::collections::BTreeMap;
use magring_hal::mmu::{PageTable, PteFlags};
use magring_hal::{PhysAddr, VirtAddr, PAGE_SIZE};

/// A range handed out by [`AddressSpace::reserve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    base: VirtAddr,
    pages: usize,
    previous_size: u64,
}

impl Reservation {
    /// First address of the range
    pub fn base(&self) -> VirtAddr {
        self.base
    }
}

/// Address space
#[derive(Debug)]
pub struct AddressSpace<P: PageTable> {
    /// Page table
    page_table: P,
    /// High-water mark of user memory
    size: u64,
    /// Exclusive upper bound of user memory
    limit: u64,
    /// Shared regions, keyed by start address
    regions: BTreeMap<u64, VmRegion>,
}

impl<P: PageTable> AddressSpace<P> {
    /// Create an address space whose user memory currently ends at `size`
    pub fn new(page_table: P, size: u64, limit: u64) -> Self {
        Self {
            page_table,
            size,
            limit,
            regions: BTreeMap::new(),
        }
    }

    /// Current high-water mark
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the page table
    pub fn page_table(&self) -> &P {
        &self.page_table
    }

    /// Get the page table mutably
    pub fn page_table_mut(&mut self) -> &mut P {
        &mut self.page_table
    }

    /// Reserve `pages` pages of virtual space at the page-aligned high-water
    /// mark. Nothing is mapped.
    pub fn reserve(&mut self, pages: usize) -> MemResult<Reservation> {
        if pages == 0 {
            return Err(MemError::InvalidSize);
        }
        let base = VirtAddr::new(self.size).page_align_up();
        let end = (pages as u64)
            .checked_mul(PAGE_SIZE as u64)
            .and_then(|len| base.as_u64().checked_add(len))
            .ok_or(MemError::AddressSpaceExhausted)?;
        if end > self.limit {
            return Err(MemError::AddressSpaceExhausted);
        }

        let reservation = Reservation {
            base,
            pages,
            previous_size: self.size,
        };
        self.size = end;
        Ok(reservation)
    }

    /// Give back a reservation.
    ///
    /// Only the most recent reservation can be returned; for any other the
    /// space simply stays reserved. Returns whether the mark moved back.
    pub fn cancel(&mut self, reservation: Reservation) -> bool {
        if reservation.base.add_pages(reservation.pages).as_u64() == self.size {
            self.size = reservation.previous_size;
            true
        } else {
            false
        }
    }

    /// Map one page of the frame at `pa` at `va`
    pub fn map_page(&mut self, va: VirtAddr, pa: PhysAddr, flags: PteFlags) -> MemResult<()> {
        self.page_table.map(va, pa, flags)?;
        Ok(())
    }

    /// Remove `count` page mappings starting at `va`. Frames are not freed.
    pub fn unmap_pages(&mut self, va: VirtAddr, count: usize) {
        self.page_table.unmap(va, count);
    }

    /// Translate a user virtual address
    pub fn translate(&self, va: VirtAddr) -> Option<PhysAddr> {
        self.page_table.translate(va)
    }

    /// Record a shared region
    pub fn add_region(&mut self, region: VmRegion) -> MemResult<()> {
        if self.regions.values().any(|existing| existing.overlaps(&region)) {
            return Err(MemError::AlreadyMapped);
        }
        self.regions.insert(region.start.as_u64(), region);
        Ok(())
    }

    /// Forget the region starting at `start`
    pub fn remove_region(&mut self, start: VirtAddr) -> MemResult<VmRegion> {
        self.regions
            .remove(&start.as_u64())
            .ok_or(MemError::NotMapped)
    }

    /// Find the region backed by shared object `object`
    pub fn find_object(&self, object: usize) -> Option<&VmRegion> {
        self.regions.values().find(|region| region.object == object)
    }

    /// Find region containing address
    pub fn find_region(&self, addr: VirtAddr) -> Option<&VmRegion> {
        self.regions.values().find(|region| region.contains(addr))
    }

    /// All recorded regions, lowest address first
    pub fn regions(&self) -> impl Iterator<Item = &VmRegion> + '_ {
        self.regions.values()
    }
}
