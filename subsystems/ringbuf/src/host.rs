//! # Host Harness
//!
//! Runs the ring subsystem as an ordinary program. A [`HostKernel`] owns a
//! heap arena standing in for physical memory and a registry drawing from
//! it; each [`HostProcess`] has its own software address space and issues
//! the `ring` system call against that kernel. Threads play the role of
//! processes.
//!
//! User virtual addresses are not dereferenceable on the host, so a process
//! reaches its memory through [`HostProcess::resolve`], which walks the
//! software page table the way a kernel's `copyin`/`copyout` would.

use crate::name::RingName;
use crate::registry::RingRegistry;
use crate::syscall::{self, RingMode};
use crate::{RingError, RingResult};
use alloc::sync::Arc;
use core::ptr::NonNull;
use magring_hal::soft::SoftPageTable;
use magring_hal::{HalError, HalResult, PhysAddr, VirtAddr, PAGE_SIZE};
use magring_memory::{AddressSpace, BitmapAllocator, FrameAllocator, FrameArena};
use spin::Mutex;

/// High-water mark of a freshly spawned process (one page of "text")
pub const HOST_USER_BASE: u64 = PAGE_SIZE as u64;

/// Exclusive upper bound of a host process's user memory
pub const HOST_USER_LIMIT: u64 = 1 << 38;

/// Kernel half of the harness
#[derive(Debug)]
pub struct HostKernel {
    // Declared before the arena: nothing may point into it once it goes.
    registry: RingRegistry<BitmapAllocator>,
    arena: FrameArena,
}

impl HostKernel {
    /// Boot a kernel with `frames` pages of physical memory
    pub fn new(frames: usize) -> RingResult<Arc<Self>> {
        let arena = FrameArena::new(frames).map_err(|e| {
            log::warn!("host: cannot set up {} frames: {}", frames, e);
            RingError::OutOfMemory
        })?;
        let registry = RingRegistry::new(arena.allocator());
        registry.initialize();
        log::debug!("host: kernel up with {} frames at {:#x}", frames, arena.base());
        Ok(Arc::new(Self { registry, arena }))
    }

    /// The ring registry
    pub fn registry(&self) -> &RingRegistry<BitmapAllocator> {
        &self.registry
    }

    /// Frames not currently backing a ring
    pub fn free_frames(&self) -> usize {
        self.registry.allocator().free_frames()
    }

    /// Total frames of physical memory
    pub fn total_frames(&self) -> usize {
        self.arena.frames()
    }

    /// Start a process with an empty address space
    pub fn spawn(self: &Arc<Self>) -> HostProcess {
        HostProcess {
            kernel: Arc::clone(self),
            space: Mutex::new(AddressSpace::new(
                SoftPageTable::new(),
                HOST_USER_BASE,
                HOST_USER_LIMIT,
            )),
        }
    }
}

/// A process of the host kernel
#[derive(Debug)]
pub struct HostProcess {
    kernel: Arc<HostKernel>,
    space: Mutex<AddressSpace<SoftPageTable>>,
}

impl HostProcess {
    /// The kernel this process runs on
    pub fn kernel(&self) -> &Arc<HostKernel> {
        &self.kernel
    }

    /// Issue the raw `ring` system call
    pub fn sys_ring(&self, name: &[u8], flag: i32) -> isize {
        let mut space = self.space.lock();
        syscall::sys_ring(self.kernel.registry(), &mut space, name, flag)
    }

    /// Issue the `ring` system call with typed arguments
    pub fn ring(&self, name: &RingName, mode: RingMode) -> RingResult<Option<VirtAddr>> {
        let mut space = self.space.lock();
        syscall::ring(self.kernel.registry(), &mut space, name, mode)
    }

    /// Translate a user address to the physical address behind it
    pub fn translate(&self, va: VirtAddr) -> Option<PhysAddr> {
        let page = self.space.lock().translate(va.page_align_down())?;
        Some(page.add(va.page_offset() as u64))
    }

    /// Host pointer for the byte at `va`.
    ///
    /// Valid up to the end of `va`'s page, for as long as the mapping stays.
    pub fn resolve(&self, va: VirtAddr) -> Option<NonNull<u8>> {
        let pa = self.translate(va)?;
        NonNull::new(pa.as_kernel_ptr::<u8>())
    }

    /// Copy `src` into user memory at `va`
    pub fn copy_out(&self, va: VirtAddr, src: &[u8]) -> HalResult<()> {
        self.walk(va, src.len(), |ptr, done, len| {
            // SAFETY: `ptr` covers `len` bytes of one mapped page.
            unsafe { core::ptr::copy_nonoverlapping(src[done..].as_ptr(), ptr, len) };
        })
    }

    /// Copy user memory at `va` into `dst`
    pub fn copy_in(&self, va: VirtAddr, dst: &mut [u8]) -> HalResult<()> {
        let len = dst.len();
        self.walk(va, len, |ptr, done, n| {
            // SAFETY: as in `copy_out`.
            unsafe { core::ptr::copy_nonoverlapping(ptr, dst[done..].as_mut_ptr(), n) };
        })
    }

    /// Visit `len` bytes at `va` one page-bounded chunk at a time.
    fn walk(&self, va: VirtAddr, len: usize, mut f: impl FnMut(*mut u8, usize, usize)) -> HalResult<()> {
        let mut done = 0;
        while done < len {
            let at = va.add(done as u64);
            let n = (PAGE_SIZE - at.page_offset()).min(len - done);
            let ptr = self.resolve(at).ok_or(HalError::NotMapped)?;
            f(ptr.as_ptr(), done, n);
            done += n;
        }
        Ok(())
    }
}

impl Drop for HostProcess {
    fn drop(&mut self) {
        let released = syscall::release_process_rings(self.kernel.registry(), self.space.get_mut());
        if released > 0 {
            log::debug!("host: exiting process dropped {} ring attachments", released);
        }
    }
}
