//! # Bitmap Allocator
//!
//! A first-fit, single-frame physical page allocator over one contiguous
//! region.

use super::{AllocatorStats, FrameAllocator};
use crate::{Frame, MemError, MemResult};
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use magring_hal::{PhysAddr, PAGE_SIZE};
use spin::Mutex;

/// Bitmap allocator
#[derive(Debug)]
pub struct BitmapAllocator {
    /// Bitmap data (1 = used, 0 = free)
    bitmap: Mutex<Vec<u64>>,
    /// Base address
    base: PhysAddr,
    /// Total number of frames
    total_frames: usize,
    /// Free frame count
    free_count: AtomicUsize,
    allocations: AtomicU64,
    deallocations: AtomicU64,
}

impl BitmapAllocator {
    /// Create an allocator over `total_frames` pages starting at `base`,
    /// all of them free.
    pub fn new(base: PhysAddr, total_frames: usize) -> Self {
        debug_assert!(base.is_page_aligned());
        let words = total_frames.div_ceil(64);

        log::debug!(
            "bitmap allocator: {} frames at {:#x}",
            total_frames,
            base
        );

        Self {
            bitmap: Mutex::new(vec![0; words]),
            base,
            total_frames,
            free_count: AtomicUsize::new(total_frames),
            allocations: AtomicU64::new(0),
            deallocations: AtomicU64::new(0),
        }
    }

    /// Get frame index from address
    fn frame_index(&self, addr: PhysAddr) -> Option<usize> {
        if !addr.is_page_aligned() || addr < self.base {
            return None;
        }
        let idx = ((addr.as_u64() - self.base.as_u64()) / PAGE_SIZE as u64) as usize;
        (idx < self.total_frames).then_some(idx)
    }

    /// Get address from frame index
    fn frame_address(&self, idx: usize) -> PhysAddr {
        self.base.add(idx as u64 * PAGE_SIZE as u64)
    }
}

impl FrameAllocator for BitmapAllocator {
    fn name(&self) -> &'static str {
        "Bitmap Allocator"
    }

    fn allocate(&self) -> MemResult<Frame> {
        let mut bitmap = self.bitmap.lock();

        let mut found = None;
        for (word_idx, word) in bitmap.iter_mut().enumerate() {
            if *word != u64::MAX {
                let bit = (!*word).trailing_zeros() as usize;
                let frame_idx = word_idx * 64 + bit;
                if frame_idx < self.total_frames {
                    *word |= 1 << bit;
                    found = Some(frame_idx);
                }
                break;
            }
        }
        drop(bitmap);

        let frame_idx = found.ok_or(MemError::OutOfMemory)?;
        self.free_count.fetch_sub(1, Ordering::SeqCst);
        self.allocations.fetch_add(1, Ordering::Relaxed);

        Ok(Frame::new(self.frame_address(frame_idx)))
    }

    fn deallocate(&self, frame: Frame) -> MemResult<()> {
        let frame_idx = self
            .frame_index(frame.address())
            .ok_or(MemError::InvalidAddress)?;

        let mut bitmap = self.bitmap.lock();
        let word = &mut bitmap[frame_idx / 64];
        let mask = 1u64 << (frame_idx % 64);
        if *word & mask == 0 {
            log::warn!("bitmap allocator: double free of {:#x}", frame.address());
            return Err(MemError::DoubleFree);
        }
        *word &= !mask;
        drop(bitmap);

        self.free_count.fetch_add(1, Ordering::SeqCst);
        self.deallocations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn free_frames(&self) -> usize {
        self.free_count.load(Ordering::SeqCst)
    }

    fn total_frames(&self) -> usize {
        self.total_frames
    }

    fn stats(&self) -> AllocatorStats {
        let allocations = self.allocations.load(Ordering::Relaxed);
        let deallocations = self.deallocations.load(Ordering::Relaxed);

        AllocatorStats {
            allocations,
            deallocations,
            in_use: allocations - deallocations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u64 = 0x8000_0000;

    #[test]
    fn test_first_fit_order() {
        let alloc = BitmapAllocator::new(PhysAddr::new(BASE), 3);

        let a = alloc.allocate().unwrap();
        let b = alloc.allocate().unwrap();
        assert_eq!(a.address(), PhysAddr::new(BASE));
        assert_eq!(b.address(), PhysAddr::new(BASE + PAGE_SIZE as u64));

        alloc.deallocate(a).unwrap();
        let c = alloc.allocate().unwrap();
        assert_eq!(c.address(), PhysAddr::new(BASE));
        assert_eq!(alloc.free_frames(), 1);
    }

    #[test]
    fn test_exhaustion() {
        let alloc = BitmapAllocator::new(PhysAddr::new(BASE), 65);
        let frames: Vec<Frame> = (0..65).map(|_| alloc.allocate().unwrap()).collect();

        assert_eq!(alloc.allocate(), Err(MemError::OutOfMemory));
        assert_eq!(alloc.free_frames(), 0);
        assert_eq!(alloc.stats().in_use, 65);

        for frame in frames {
            alloc.deallocate(frame).unwrap();
        }
        assert_eq!(alloc.free_frames(), 65);
    }

    #[test]
    fn test_rejects_foreign_and_double_free() {
        let alloc = BitmapAllocator::new(PhysAddr::new(BASE), 4);

        assert_eq!(
            alloc.deallocate(Frame::new(PhysAddr::new(BASE + 64 * PAGE_SIZE as u64))),
            Err(MemError::InvalidAddress)
        );
        assert_eq!(
            alloc.deallocate(Frame::new(PhysAddr::new(BASE))),
            Err(MemError::DoubleFree)
        );
        assert_eq!(alloc.free_frames(), 4);
    }
}
