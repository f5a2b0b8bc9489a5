//! # Ring Mapper
//!
//! Projects a ring into the calling process as one contiguous region above
//! its high-water mark:
//!
//! ```text
//!  base                                   base + RING_CAPACITY
//!   │                                       │
//!   ▼                                       ▼
//!   ┌──────┬──────┬─────────────────┬──────┬──────────────┐
//!   │ d[0] │ d[1] │       ...       │d[15] │ bookkeeping  │
//!   └──────┴──────┴─────────────────┴──────┴──────────────┘
//! ```
//!
//! Every page is mapped read-write for user mode. If any page fails, every
//! page mapped by the same call is unmapped and the reservation is given
//! back, so the address space looks as if the call never happened.
//!
//! Unmapping only removes page-table entries; the registry owns the frames.

use crate::config::RING_REGION_PAGES;
use crate::registry::{RingRegistry, SlotId};
use crate::slot::RingFrames;
use crate::{RingError, RingResult};
use magring_hal::mmu::{PageTable, PteFlags};
use magring_hal::VirtAddr;
use magring_memory::{AddressSpace, FrameAllocator, Reservation, VmRegion};

/// Map `frames` into `space`, returning the reservation they occupy
pub fn map_frames<P: PageTable>(space: &mut AddressSpace<P>, frames: &RingFrames) -> RingResult<Reservation> {
    let reservation = space.reserve(RING_REGION_PAGES).map_err(|e| {
        log::warn!("ring map: cannot reserve {} pages: {}", RING_REGION_PAGES, e);
        RingError::MapFailed
    })?;
    let base = reservation.base();
    let flags = PteFlags::user_data();

    for (i, pa) in frames.iter().enumerate() {
        let va = base.add_pages(i);
        if let Err(e) = space.map_page(va, pa, flags) {
            log::warn!(
                "ring map: page {} at {:#x} failed ({}), rolling back {} pages",
                i,
                va,
                e,
                i
            );
            space.unmap_pages(base, i);
            space.cancel(reservation);
            return Err(RingError::MapFailed);
        }
    }

    log::trace!("ring map: {} pages at {:#x}", RING_REGION_PAGES, base);
    Ok(reservation)
}

/// Map the ring in `slot` into the calling process and record the region.
pub fn map_into_caller<A, P>(
    registry: &RingRegistry<A>,
    slot: SlotId,
    space: &mut AddressSpace<P>,
) -> RingResult<VirtAddr>
where
    A: FrameAllocator,
    P: PageTable,
{
    let frames = registry.frames(slot)?;
    let reservation = map_frames(space, &frames)?;
    let base = reservation.base();

    let region = VmRegion {
        start: base,
        pages: RING_REGION_PAGES,
        flags: PteFlags::user_data(),
        object: slot.index(),
    };
    if let Err(e) = space.add_region(region) {
        log::warn!("ring map: region at {:#x} not recorded: {}", base, e);
        space.unmap_pages(base, RING_REGION_PAGES);
        space.cancel(reservation);
        return Err(RingError::MapFailed);
    }
    Ok(base)
}

/// Unmap the caller's view of the ring in `slot`, if it has one.
///
/// Returns the base of the removed region.
pub fn unmap_from_caller<P: PageTable>(space: &mut AddressSpace<P>, slot: SlotId) -> Option<VirtAddr> {
    let start = space.find_object(slot.index())?.start;
    space.unmap_pages(start, RING_REGION_PAGES);
    // The region was just found, so removal cannot miss.
    let _ = space.remove_region(start);
    log::trace!("ring unmap: {} pages at {:#x}", RING_REGION_PAGES, start);
    Some(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RING_CAPACITY, RING_PAGES};
    use crate::name::RingName;
    use magring_hal::soft::SoftPageTable;
    use magring_hal::PAGE_SIZE;
    use magring_memory::FrameArena;

    const LIMIT: u64 = 1 << 38;

    fn setup() -> (FrameArena, RingRegistry<magring_memory::BitmapAllocator>, SlotId) {
        let arena = FrameArena::new(RING_REGION_PAGES).unwrap();
        let registry = RingRegistry::new(arena.allocator());
        let slot = registry.create_or_attach(&RingName::from("x")).unwrap().slot;
        (arena, registry, slot)
    }

    #[test]
    fn test_maps_data_then_bookkeeping() {
        let (_arena, registry, slot) = setup();
        let mut space = AddressSpace::new(SoftPageTable::new(), 0x2345, LIMIT);

        let base = map_into_caller(&registry, slot, &mut space).unwrap();
        assert_eq!(base, VirtAddr::new(0x3000));
        assert_eq!(space.size(), 0x3000 + (RING_REGION_PAGES * PAGE_SIZE) as u64);

        let frames = registry.frames(slot).unwrap();
        for (i, pa) in frames.data.iter().enumerate() {
            assert_eq!(space.translate(base.add_pages(i)), Some(*pa));
        }
        let book_va = base.add(RING_CAPACITY as u64);
        assert_eq!(space.translate(book_va), Some(frames.bookkeeping));

        let (_, flags) = space.page_table().query(book_va).unwrap();
        assert!(flags.contains(PteFlags::USER | PteFlags::READ | PteFlags::WRITE));
        assert_eq!(space.find_object(slot.index()).map(|r| r.start), Some(base));
    }

    #[test]
    fn test_bookkeeping_failure_rolls_back_data_pages() {
        let (_arena, registry, slot) = setup();
        let mut space = AddressSpace::new(SoftPageTable::new(), 0x1000, LIMIT);
        space.page_table_mut().fail_map_after(RING_PAGES);

        assert_eq!(map_into_caller(&registry, slot, &mut space), Err(RingError::MapFailed));
        assert_eq!(space.page_table().mapped_pages(), 0);
        assert_eq!(space.size(), 0x1000);
        assert_eq!(space.regions().count(), 0);
    }

    #[test]
    fn test_mid_buffer_failure_rolls_back() {
        let (_arena, registry, slot) = setup();
        let mut space = AddressSpace::new(SoftPageTable::new(), 0x1000, LIMIT);
        space.page_table_mut().fail_map_after(5);

        assert_eq!(map_into_caller(&registry, slot, &mut space), Err(RingError::MapFailed));
        assert_eq!(space.page_table().mapped_pages(), 0);

        // Nothing left behind: the next attempt lands at the same base.
        let base = map_into_caller(&registry, slot, &mut space).unwrap();
        assert_eq!(base, VirtAddr::new(0x1000));
        assert_eq!(space.page_table().mapped_pages(), RING_REGION_PAGES);
    }

    #[test]
    fn test_unrecordable_region_rolls_back() {
        let (_arena, registry, slot) = setup();
        let mut space = AddressSpace::new(SoftPageTable::new(), 0x1000, LIMIT);
        space
            .add_region(VmRegion {
                start: VirtAddr::new(0x5000),
                pages: 1,
                flags: PteFlags::user_data(),
                object: usize::MAX,
            })
            .unwrap();

        assert_eq!(map_into_caller(&registry, slot, &mut space), Err(RingError::MapFailed));
        assert_eq!(space.page_table().mapped_pages(), 0);
        assert_eq!(space.size(), 0x1000);
        assert_eq!(space.regions().count(), 1);
        assert!(space.find_object(slot.index()).is_none());
    }

    #[test]
    fn test_exhausted_space_fails_cleanly() {
        let (_arena, registry, slot) = setup();
        let limit = (RING_REGION_PAGES * PAGE_SIZE) as u64;
        let mut space = AddressSpace::new(SoftPageTable::new(), PAGE_SIZE as u64, limit);

        assert_eq!(map_into_caller(&registry, slot, &mut space), Err(RingError::MapFailed));
        assert_eq!(space.size(), PAGE_SIZE as u64);
    }

    #[test]
    fn test_unmap_from_caller() {
        let (_arena, registry, slot) = setup();
        let mut space = AddressSpace::new(SoftPageTable::new(), 0, LIMIT);
        let base = map_into_caller(&registry, slot, &mut space).unwrap();

        assert_eq!(unmap_from_caller(&mut space, slot), Some(base));
        assert_eq!(space.page_table().mapped_pages(), 0);
        assert_eq!(unmap_from_caller(&mut space, slot), None);
        // Frames stay with the registry.
        assert!(registry.frames(slot).is_ok());
    }
}
