//! # Ring Registry
//!
//! The kernel's table of rings. One spinlock covers the whole table and is
//! held across every search-then-mutate sequence, on the create path and
//! the destroy path alike, so two processes racing to create the same name
//! always end up sharing one slot.
//!
//! The lock guards slot metadata only. Ring contents and counters are never
//! touched under it.

use crate::config::MAX_RINGS;
use crate::name::RingName;
use crate::slot::{RingFrames, RingSlot};
use crate::{RingError, RingResult};
use core::sync::atomic::{AtomicBool, Ordering};
use magring_memory::FrameAllocator;
use spin::{Mutex, MutexGuard};

/// Index of a slot in the registry table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(usize);

impl SlotId {
    /// Wrap a raw table index
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw table index
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Outcome of [`RingRegistry::create_or_attach`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attached {
    /// Slot holding the ring
    pub slot: SlotId,
    /// Whether this call allocated the ring
    pub created: bool,
}

/// Outcome of a detach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detached {
    /// Slot that held the ring
    pub slot: SlotId,
    /// Whether the last attachment went away and the pages were freed
    pub released: bool,
}

const FREE_SLOT: RingSlot = RingSlot::empty();

type Table = [RingSlot; MAX_RINGS];

/// Ring registry
#[derive(Debug)]
pub struct RingRegistry<A: FrameAllocator> {
    /// Slot table
    table: Mutex<Table>,
    /// Set once the table has been cleared; read and written under `table`
    initialized: AtomicBool,
    /// Source of ring pages
    allocator: A,
}

impl<A: FrameAllocator> RingRegistry<A> {
    /// Create a registry drawing pages from `allocator`.
    ///
    /// Usable in a `static`; the table is cleared on first use.
    pub const fn new(allocator: A) -> Self {
        Self {
            table: Mutex::new([FREE_SLOT; MAX_RINGS]),
            initialized: AtomicBool::new(false),
            allocator,
        }
    }

    /// Get the page allocator
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Clear the table if nobody has yet. Idempotent; the first call wins.
    pub fn initialize(&self) {
        drop(self.lock());
    }

    /// Check whether the table has been cleared
    pub fn is_initialized(&self) -> bool {
        let _table = self.table.lock();
        self.initialized.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        let mut table = self.table.lock();
        if !self.initialized.load(Ordering::SeqCst) {
            for slot in table.iter_mut() {
                *slot = RingSlot::empty();
            }
            self.initialized.store(true, Ordering::SeqCst);
            log::debug!("ring registry initialized ({} slots)", MAX_RINGS);
        }
        table
    }

    fn find(table: &Table, name: &RingName) -> Option<usize> {
        table
            .iter()
            .position(|slot| slot.is_live() && slot.name() == name)
    }

    /// Attach to the live ring called `name`, creating it if there is none.
    pub fn create_or_attach(&self, name: &RingName) -> RingResult<Attached> {
        let mut table = self.lock();

        if let Some(index) = Self::find(&table, name) {
            let slot = &mut table[index];
            slot.attach();
            log::debug!(
                "ring {}: attached to slot {} (refcount {})",
                name,
                index,
                slot.refcount()
            );
            return Ok(Attached {
                slot: SlotId(index),
                created: false,
            });
        }

        let Some(index) = table.iter().position(|slot| !slot.is_live()) else {
            log::warn!("ring {}: no free slot", name);
            return Err(RingError::NoFreeSlot);
        };

        table[index] = RingSlot::allocate(name.clone(), &self.allocator)?;
        log::debug!("ring {}: created in slot {}", name, index);

        Ok(Attached {
            slot: SlotId(index),
            created: true,
        })
    }

    /// Drop one attachment to the ring called `name`, freeing its pages
    /// when it was the last.
    pub fn detach(&self, name: &RingName) -> RingResult<Detached> {
        let mut table = self.lock();
        let index = Self::find(&table, name).ok_or(RingError::NotFound)?;
        Ok(self.detach_locked(&mut table, index))
    }

    /// Drop one attachment to the ring in `slot`
    pub fn detach_slot(&self, slot: SlotId) -> RingResult<Detached> {
        let mut table = self.lock();
        if !table.get(slot.0).is_some_and(RingSlot::is_live) {
            return Err(RingError::NotFound);
        }
        Ok(self.detach_locked(&mut table, slot.0))
    }

    fn detach_locked(&self, table: &mut Table, index: usize) -> Detached {
        let slot = &mut table[index];
        let remaining = slot.detach();
        if remaining > 0 {
            log::debug!(
                "ring {}: detached from slot {} (refcount {})",
                slot.name(),
                index,
                remaining
            );
            return Detached {
                slot: SlotId(index),
                released: false,
            };
        }

        let old = core::mem::replace(slot, RingSlot::empty());
        log::debug!("ring {}: released slot {}", old.name(), index);
        old.release(&self.allocator);
        Detached {
            slot: SlotId(index),
            released: true,
        }
    }

    /// Slot of the live ring called `name`
    pub fn lookup(&self, name: &RingName) -> Option<SlotId> {
        Self::find(&self.lock(), name).map(SlotId)
    }

    /// Attachments to the ring called `name`; zero if there is none
    pub fn refcount(&self, name: &RingName) -> usize {
        let table = self.lock();
        Self::find(&table, name).map_or(0, |index| table[index].refcount())
    }

    /// Number of live rings
    pub fn live_rings(&self) -> usize {
        self.lock().iter().filter(|slot| slot.is_live()).count()
    }

    /// Snapshot of the frames backing the ring in `slot`.
    ///
    /// The snapshot stays valid while the caller holds an attachment.
    pub fn frames(&self, slot: SlotId) -> RingResult<RingFrames> {
        self.lock()
            .get(slot.0)
            .and_then(RingSlot::frames)
            .ok_or(RingError::NotFound)
    }

    /// Current `(read_done, write_done)` of the ring in `slot`
    pub fn counters(&self, slot: SlotId) -> RingResult<(u64, u64)> {
        let table = self.lock();
        let book = table
            .get(slot.0)
            .and_then(RingSlot::bookkeeping)
            .ok_or(RingError::NotFound)?;
        Ok((book.read_done(), book.write_done()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RING_PAGES;
    use magring_memory::{BitmapAllocator, FrameArena};
    use std::sync::Arc;
    use std::thread;

    const RING_FRAMES: usize = RING_PAGES + 1;

    fn registry(rings: usize) -> (FrameArena, RingRegistry<BitmapAllocator>) {
        let arena = FrameArena::new(rings * RING_FRAMES).unwrap();
        let registry = RingRegistry::new(arena.allocator());
        (arena, registry)
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (_arena, reg) = registry(1);
        assert!(!reg.is_initialized());
        reg.initialize();
        reg.create_or_attach(&"a".into()).unwrap();
        reg.initialize();

        assert!(reg.is_initialized());
        assert_eq!(reg.refcount(&"a".into()), 1);
    }

    #[test]
    fn test_create_then_attach_shares_slot() {
        let (_arena, reg) = registry(1);
        let name = RingName::from("x");

        let first = reg.create_or_attach(&name).unwrap();
        let second = reg.create_or_attach(&name).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.slot, second.slot);
        assert_eq!(reg.refcount(&name), 2);
        assert_eq!(reg.live_rings(), 1);
    }

    #[test]
    fn test_k_detaches_release_pages() {
        let (arena, reg) = registry(1);
        let name = RingName::from("x");
        for _ in 0..3 {
            reg.create_or_attach(&name).unwrap();
        }
        assert_eq!(reg.allocator().free_frames(), arena.frames() - RING_FRAMES);

        assert!(!reg.detach(&name).unwrap().released);
        assert!(!reg.detach(&name).unwrap().released);
        assert!(reg.detach(&name).unwrap().released);

        assert_eq!(reg.allocator().free_frames(), arena.frames());
        assert_eq!(reg.lookup(&name), None);
        assert_eq!(reg.detach(&name), Err(RingError::NotFound));
    }

    #[test]
    fn test_detach_unknown_mutates_nothing() {
        let (_arena, reg) = registry(1);
        reg.create_or_attach(&"x".into()).unwrap();

        assert_eq!(reg.detach(&"y".into()), Err(RingError::NotFound));
        assert_eq!(reg.refcount(&"x".into()), 1);
        assert_eq!(reg.detach_slot(SlotId::new(MAX_RINGS)), Err(RingError::NotFound));
        assert_eq!(reg.detach_slot(SlotId::new(1)), Err(RingError::NotFound));
    }

    #[test]
    fn test_full_table_rejects_new_name() {
        let (_arena, reg) = registry(MAX_RINGS + 1);
        for i in 0..MAX_RINGS {
            reg.create_or_attach(&RingName::new(&[b'r', b'0' + i as u8])).unwrap();
        }
        let free_before = reg.allocator().free_frames();

        assert_eq!(reg.create_or_attach(&"extra".into()), Err(RingError::NoFreeSlot));
        assert_eq!(reg.live_rings(), MAX_RINGS);
        assert_eq!(reg.allocator().free_frames(), free_before);

        // Existing names still attach when the table is full.
        assert!(!reg.create_or_attach(&"r0".into()).unwrap().created);
    }

    #[test]
    fn test_out_of_memory_leaves_table_unchanged() {
        let arena = FrameArena::new(RING_FRAMES - 1).unwrap();
        let reg = RingRegistry::new(arena.allocator());

        assert_eq!(reg.create_or_attach(&"x".into()), Err(RingError::OutOfMemory));
        assert_eq!(reg.live_rings(), 0);
        assert_eq!(reg.allocator().free_frames(), RING_FRAMES - 1);
    }

    #[test]
    fn test_freed_slot_is_reused() {
        let (_arena, reg) = registry(2);
        let a = reg.create_or_attach(&"a".into()).unwrap();
        reg.create_or_attach(&"b".into()).unwrap();
        reg.detach(&"a".into()).unwrap();

        let c = reg.create_or_attach(&"c".into()).unwrap();
        assert_eq!(c.slot, a.slot);
        let (read, write) = reg.counters(c.slot).unwrap();
        assert_eq!((read, write), (0, 0));
    }

    #[test]
    fn test_racing_creators_share_one_slot() {
        for _ in 0..32 {
            let (_arena, reg) = registry(2);
            let reg = Arc::new(reg);

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let reg = Arc::clone(&reg);
                    thread::spawn(move || reg.create_or_attach(&"race".into()).unwrap())
                })
                .collect();
            let results: Vec<Attached> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            assert_eq!(reg.live_rings(), 1);
            assert_eq!(reg.refcount(&"race".into()), 2);
            assert_eq!(results[0].slot, results[1].slot);
            assert_eq!(results.iter().filter(|r| r.created).count(), 1);
        }
    }
}
