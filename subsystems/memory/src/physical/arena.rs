//! # Frame Arena
//!
//! A page-aligned block taken from the global heap and treated as a range of
//! physical memory. Under the kernel's one-to-one direct map a heap address
//! is also a physical address, so frames carved out of an arena can be
//! zeroed, shared and mapped like any other page.

use super::bitmap::BitmapAllocator;
use crate::{MemError, MemResult};
use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use core::ptr::NonNull;
use magring_hal::{PhysAddr, PAGE_SIZE};

/// Heap-backed range of page frames
#[derive(Debug)]
pub struct FrameArena {
    base: NonNull<u8>,
    layout: Layout,
    frames: usize,
}

// SAFETY: the arena only hands out addresses; access to the pages is
// synchronized by whoever owns the frames carved from it.
unsafe impl Send for FrameArena {}
// SAFETY: see above; the arena itself is immutable after construction.
unsafe impl Sync for FrameArena {}

impl FrameArena {
    /// Reserve `frames` zeroed pages
    pub fn new(frames: usize) -> MemResult<Self> {
        if frames == 0 {
            return Err(MemError::InvalidSize);
        }
        let size = frames.checked_mul(PAGE_SIZE).ok_or(MemError::InvalidSize)?;
        let layout = Layout::from_size_align(size, PAGE_SIZE).map_err(|_| MemError::InvalidSize)?;

        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or(MemError::OutOfMemory)?;

        Ok(Self { base, layout, frames })
    }

    /// First frame of the arena
    pub fn base(&self) -> PhysAddr {
        PhysAddr::new(self.base.as_ptr() as usize as u64)
    }

    /// Number of frames in the arena
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Check if `addr` falls inside the arena
    pub fn contains(&self, addr: PhysAddr) -> bool {
        let start = self.base().as_u64();
        addr.as_u64() >= start && addr.as_u64() < start + self.layout.size() as u64
    }

    /// Bitmap allocator handing out this arena's frames.
    ///
    /// The allocator borrows nothing, so the arena must outlive every frame
    /// it returns.
    pub fn allocator(&self) -> BitmapAllocator {
        BitmapAllocator::new(self.base(), self.frames)
    }
}

impl Drop for FrameArena {
    fn drop(&mut self) {
        // SAFETY: `base` came from `alloc_zeroed` with this exact layout.
        unsafe { dealloc(self.base.as_ptr(), self.layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FrameAllocator;

    #[test]
    fn test_arena_frames_are_aligned_and_zeroed() {
        let arena = FrameArena::new(4).unwrap();
        assert!(arena.base().is_page_aligned());

        let alloc = arena.allocator();
        let frame = alloc.allocate().unwrap();
        assert!(arena.contains(frame.address()));

        let page = frame.address().as_kernel_ptr::<u8>();
        // SAFETY: the frame lies inside the live arena.
        unsafe {
            assert_eq!(*page.add(PAGE_SIZE - 1), 0);
            *page = 0xAB;
            frame.zero();
            assert_eq!(*page, 0);
        }
        alloc.deallocate(frame).unwrap();
    }

    #[test]
    fn test_empty_arena_rejected() {
        assert_eq!(FrameArena::new(0).err(), Some(MemError::InvalidSize));
    }
}
