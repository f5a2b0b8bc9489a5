//! # Ring Slots
//!
//! One entry of the registry table. A live slot owns every frame of its
//! ring; a free slot owns none. The constructors and [`RingSlot::release`]
//! are the only places frames enter or leave a slot, which keeps
//! `refcount > 0` equivalent to "all pages allocated".

use crate::book::Bookkeeping;
use crate::config::{BOOKKEEPING_BASELINE, RING_PAGES};
use crate::name::RingName;
use crate::{RingError, RingResult};
use arrayvec::ArrayVec;
use magring_hal::PhysAddr;
use magring_memory::{Frame, FrameAllocator};

/// Physical layout of a live ring, copied out of the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingFrames {
    /// Data pages in buffer order
    pub data: [PhysAddr; RING_PAGES],
    /// Bookkeeping page
    pub bookkeeping: PhysAddr,
}

impl RingFrames {
    /// Every frame in mapping order: data pages, then bookkeeping
    pub fn iter(&self) -> impl Iterator<Item = PhysAddr> + '_ {
        self.data
            .iter()
            .copied()
            .chain(core::iter::once(self.bookkeeping))
    }
}

/// Registry entry
#[derive(Debug)]
pub struct RingSlot {
    refcount: usize,
    name: RingName,
    pages: ArrayVec<Frame, RING_PAGES>,
    book: Option<Frame>,
}

impl RingSlot {
    /// A free slot
    pub const fn empty() -> Self {
        Self {
            refcount: 0,
            name: RingName::empty(),
            pages: ArrayVec::new_const(),
            book: None,
        }
    }

    /// Allocate, zero and initialize the pages of a new ring.
    ///
    /// On failure every frame taken so far goes back to `allocator`.
    pub(crate) fn allocate<A: FrameAllocator>(name: RingName, allocator: &A) -> RingResult<Self> {
        let mut slot = Self {
            refcount: 0,
            name,
            pages: ArrayVec::new(),
            book: None,
        };

        while !slot.pages.is_full() {
            let frame = match allocator.allocate() {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!(
                        "ring {}: data page {} allocation failed: {}",
                        slot.name,
                        slot.pages.len(),
                        e
                    );
                    slot.release_frames(allocator);
                    return Err(RingError::OutOfMemory);
                }
            };
            // SAFETY: the frame is fresh from the allocator and direct-mapped.
            unsafe { frame.zero() };
            slot.pages.push(frame);
        }

        match allocator.allocate() {
            Ok(frame) => {
                // SAFETY: as above.
                unsafe { frame.zero() };
                slot.book = Some(frame);
            }
            Err(e) => {
                log::warn!("ring {}: bookkeeping page allocation failed: {}", slot.name, e);
                slot.release_frames(allocator);
                return Err(RingError::OutOfMemory);
            }
        }

        if let Some(book) = slot.bookkeeping() {
            book.reset(BOOKKEEPING_BASELINE);
        }
        slot.refcount = 1;
        Ok(slot)
    }

    /// Tear the slot down, returning its frames to `allocator`
    pub(crate) fn release<A: FrameAllocator>(mut self, allocator: &A) {
        self.release_frames(allocator);
    }

    fn release_frames<A: FrameAllocator>(&mut self, allocator: &A) {
        let frames = self.pages.drain(..).chain(self.book.take());
        for frame in frames {
            let addr = frame.address();
            if let Err(e) = allocator.deallocate(frame) {
                log::warn!("ring {}: freeing {:#x}: {}", self.name, addr, e);
            }
        }
    }

    /// Check if the slot holds a ring
    pub fn is_live(&self) -> bool {
        self.refcount > 0
    }

    /// Number of attachments
    pub fn refcount(&self) -> usize {
        self.refcount
    }

    /// Ring name
    pub fn name(&self) -> &RingName {
        &self.name
    }

    pub(crate) fn attach(&mut self) {
        self.refcount += 1;
    }

    /// Drop one attachment, returning how many remain
    pub(crate) fn detach(&mut self) -> usize {
        self.refcount -= 1;
        self.refcount
    }

    /// Frames of a live ring
    pub fn frames(&self) -> Option<RingFrames> {
        let book = self.book.as_ref()?;
        if !self.pages.is_full() {
            return None;
        }
        Some(RingFrames {
            data: core::array::from_fn(|i| self.pages[i].address()),
            bookkeeping: book.address(),
        })
    }

    /// Counters on the bookkeeping page, through the kernel direct map
    pub fn bookkeeping(&self) -> Option<&Bookkeeping> {
        let frame = self.book.as_ref()?;
        // SAFETY: the slot owns the frame for as long as `self` is borrowed,
        // the page is direct-mapped and page-aligned, and `Bookkeeping` is
        // only atomics, so shared access from user space is sound.
        Some(unsafe { &*frame.address().as_kernel_ptr::<Bookkeeping>() })
    }
}

impl Default for RingSlot {
    fn default() -> Self {
        Self::empty()
    }
}
