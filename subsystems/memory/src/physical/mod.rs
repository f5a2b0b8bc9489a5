//! # Physical Memory Management
//!
//! The frame allocator seam and the allocators shipped with the subsystem.

pub mod arena;
pub mod bitmap;

use crate::{Frame, MemResult};

/// Physical frame allocator.
///
/// Allocators are shared between processors, so every method takes
/// `&self` and implementations lock internally.
pub trait FrameAllocator: Send + Sync {
    /// Get allocator name
    fn name(&self) -> &'static str;

    /// Allocate a single page
    fn allocate(&self) -> MemResult<Frame>;

    /// Return a page to the allocator
    fn deallocate(&self, frame: Frame) -> MemResult<()>;

    /// Get free frame count
    fn free_frames(&self) -> usize;

    /// Get total frame count
    fn total_frames(&self) -> usize;

    /// Get statistics
    fn stats(&self) -> AllocatorStats;
}

/// Allocator statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Total allocations
    pub allocations: u64,
    /// Total deallocations
    pub deallocations: u64,
    /// Frames currently handed out
    pub in_use: u64,
}
