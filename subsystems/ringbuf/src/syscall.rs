//! # The `ring` System Call
//!
//! `ring(name, flag)`: a non-zero flag creates the ring or attaches to it
//! and returns where it was mapped in the caller; a zero flag detaches and
//! returns 0. Every failure is reported to user space as -1.

use crate::mapper;
use crate::name::RingName;
use crate::registry::{RingRegistry, SlotId};
use crate::{RingError, RingResult};
use magring_hal::mmu::PageTable;
use magring_hal::VirtAddr;
use magring_memory::{AddressSpace, FrameAllocator};

/// What a `ring` call asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RingMode {
    /// Drop the caller's attachment
    Detach = 0,
    /// Create the ring or attach to it, and map it
    CreateOrAttach = 1,
}

impl RingMode {
    /// Decode the user-supplied flag
    pub fn from_flag(flag: i32) -> Self {
        if flag != 0 {
            RingMode::CreateOrAttach
        } else {
            RingMode::Detach
        }
    }

    /// Encode for the system call
    pub fn flag(self) -> i32 {
        self as i32
    }
}

/// Serve one `ring` request for the process owning `space`.
///
/// Returns the mapped base for [`RingMode::CreateOrAttach`] and `None` for
/// [`RingMode::Detach`]. A create or attach that cannot be mapped gives
/// back the reference it took, so the registry is as it was before the
/// call (or the ring is gone, if this call created it).
pub fn ring<A, P>(
    registry: &RingRegistry<A>,
    space: &mut AddressSpace<P>,
    name: &RingName,
    mode: RingMode,
) -> RingResult<Option<VirtAddr>>
where
    A: FrameAllocator,
    P: PageTable,
{
    match mode {
        RingMode::CreateOrAttach => {
            let attached = registry.create_or_attach(name)?;
            match mapper::map_into_caller(registry, attached.slot, space) {
                Ok(base) => {
                    log::debug!("ring {}: mapped at {:#x}", name, base);
                    Ok(Some(base))
                }
                Err(e) => {
                    if let Err(undo) = registry.detach_slot(attached.slot) {
                        log::error!("ring {}: undoing attach: {}", name, undo);
                    }
                    Err(e)
                }
            }
        }
        RingMode::Detach => {
            // Unmap before the registry can free the frames.
            let slot = registry.lookup(name).ok_or(RingError::NotFound)?;
            mapper::unmap_from_caller(space, slot);
            registry.detach(name)?;
            Ok(None)
        }
    }
}

/// System call entry point: `name` is the raw user string, `flag` the raw
/// mode. Returns the base address, 0 for a detach, or -1.
pub fn sys_ring<A, P>(
    registry: &RingRegistry<A>,
    space: &mut AddressSpace<P>,
    name: &[u8],
    flag: i32,
) -> isize
where
    A: FrameAllocator,
    P: PageTable,
{
    let name = RingName::new(name);
    match ring(registry, space, &name, RingMode::from_flag(flag)) {
        Ok(Some(base)) => base.as_u64() as isize,
        Ok(None) => 0,
        Err(e) => {
            log::warn!("ring({}, {}): {}", name, flag, e);
            -1
        }
    }
}

/// Drop every attachment held through regions of `space`.
///
/// Called when a process exits so the rings it never detached from can
/// still be reclaimed. Returns the number of attachments dropped.
pub fn release_process_rings<A, P>(registry: &RingRegistry<A>, space: &mut AddressSpace<P>) -> usize
where
    A: FrameAllocator,
    P: PageTable,
{
    let mut released = 0;
    loop {
        let Some(slot) = space.regions().next().map(|region| SlotId::new(region.object)) else {
            break;
        };
        mapper::unmap_from_caller(space, slot);
        match registry.detach_slot(slot) {
            Ok(_) => released += 1,
            Err(e) => log::warn!("exit: slot {} not released: {}", slot.index(), e),
        }
    }
    released
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RING_PAGES, RING_REGION_PAGES};
    use magring_hal::soft::SoftPageTable;
    use magring_hal::PAGE_SIZE;
    use magring_memory::{BitmapAllocator, FrameArena};

    const LIMIT: u64 = 1 << 38;

    fn kernel(rings: usize) -> (FrameArena, RingRegistry<BitmapAllocator>) {
        let arena = FrameArena::new(rings * RING_REGION_PAGES).unwrap();
        let registry = RingRegistry::new(arena.allocator());
        (arena, registry)
    }

    fn process() -> AddressSpace<SoftPageTable> {
        AddressSpace::new(SoftPageTable::new(), 0x4000, LIMIT)
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(RingMode::from_flag(0), RingMode::Detach);
        assert_eq!(RingMode::from_flag(1), RingMode::CreateOrAttach);
        assert_eq!(RingMode::from_flag(-7), RingMode::CreateOrAttach);
        assert_eq!(RingMode::CreateOrAttach.flag(), 1);
    }

    #[test]
    fn test_two_processes_share_frames() {
        let (_arena, registry) = kernel(1);
        let mut a = process();
        let mut b = AddressSpace::new(SoftPageTable::new(), 0x9000, LIMIT);
        let name = RingName::from("magic!");

        let va_a = ring(&registry, &mut a, &name, RingMode::CreateOrAttach).unwrap().unwrap();
        let va_b = ring(&registry, &mut b, &name, RingMode::CreateOrAttach).unwrap().unwrap();

        assert_eq!(registry.refcount(&name), 2);
        for i in 0..RING_REGION_PAGES {
            assert_eq!(a.translate(va_a.add_pages(i)), b.translate(va_b.add_pages(i)));
        }
    }

    #[test]
    fn test_sys_ring_return_values() {
        let (_arena, registry) = kernel(1);
        let mut space = process();

        let base = sys_ring(&registry, &mut space, b"rb\0", 1);
        assert_eq!(base, 0x4000);
        assert_eq!(sys_ring(&registry, &mut space, b"rb", 0), 0);
        assert_eq!(sys_ring(&registry, &mut space, b"rb", 0), -1);
        assert_eq!(space.page_table().mapped_pages(), 0);
    }

    #[test]
    fn test_map_failure_undoes_create() {
        let (arena, registry) = kernel(1);
        let mut space = process();
        space.page_table_mut().fail_map_after(RING_PAGES);

        assert_eq!(sys_ring(&registry, &mut space, b"rb", 1), -1);
        assert_eq!(registry.live_rings(), 0);
        assert_eq!(registry.allocator().free_frames(), arena.frames());
        assert_eq!(space.page_table().mapped_pages(), 0);
        assert_eq!(space.size(), 0x4000);
    }

    #[test]
    fn test_map_failure_undoes_attach() {
        let (_arena, registry) = kernel(1);
        let mut owner = process();
        let mut joiner = process();
        let name = RingName::from("rb");
        ring(&registry, &mut owner, &name, RingMode::CreateOrAttach).unwrap();

        joiner.page_table_mut().fail_map_after(0);
        assert_eq!(
            ring(&registry, &mut joiner, &name, RingMode::CreateOrAttach),
            Err(RingError::MapFailed)
        );
        assert_eq!(registry.refcount(&name), 1);
    }

    #[test]
    fn test_address_space_exhausted() {
        let (_arena, registry) = kernel(1);
        let mut space = AddressSpace::new(SoftPageTable::new(), 0, (RING_PAGES * PAGE_SIZE) as u64);

        assert_eq!(sys_ring(&registry, &mut space, b"rb", 1), -1);
        assert_eq!(registry.live_rings(), 0);
    }

    #[test]
    fn test_detach_keeps_ring_for_other_attacher() {
        let (_arena, registry) = kernel(1);
        let mut a = process();
        let mut b = process();
        let name = RingName::from("rb");
        ring(&registry, &mut a, &name, RingMode::CreateOrAttach).unwrap();
        ring(&registry, &mut b, &name, RingMode::CreateOrAttach).unwrap();

        assert_eq!(ring(&registry, &mut a, &name, RingMode::Detach), Ok(None));
        assert_eq!(a.page_table().mapped_pages(), 0);
        assert_eq!(b.page_table().mapped_pages(), RING_REGION_PAGES);
        assert_eq!(registry.refcount(&name), 1);
    }

    #[test]
    fn test_last_detach_unmaps_and_frees() {
        let (arena, registry) = kernel(1);
        let mut space = process();
        let name = RingName::from("rb");
        let base = ring(&registry, &mut space, &name, RingMode::CreateOrAttach)
            .unwrap()
            .unwrap();

        assert_eq!(ring(&registry, &mut space, &name, RingMode::Detach), Ok(None));
        assert_eq!(space.translate(base), None);
        assert_eq!(space.regions().count(), 0);
        assert_eq!(registry.live_rings(), 0);
        assert_eq!(registry.allocator().free_frames(), arena.frames());

        assert_eq!(
            ring(&registry, &mut space, &name, RingMode::Detach),
            Err(RingError::NotFound)
        );
    }

    #[test]
    fn test_release_process_rings_on_exit() {
        let (arena, registry) = kernel(2);
        let mut space = process();
        sys_ring(&registry, &mut space, b"one", 1);
        sys_ring(&registry, &mut space, b"two", 1);
        assert_eq!(registry.live_rings(), 2);

        assert_eq!(release_process_rings(&registry, &mut space), 2);
        assert_eq!(registry.live_rings(), 0);
        assert_eq!(registry.allocator().free_frames(), arena.frames());
        assert_eq!(space.regions().count(), 0);
        assert_eq!(release_process_rings(&registry, &mut space), 0);
    }
}
