//! # Kernel Seam
//!
//! The user library talks to the kernel through [`RingSys`] only. On the
//! real kernel user addresses are directly dereferenceable and the default
//! [`RingSys::resolve`] is the identity; a simulated process overrides it
//! to walk its own page table.

use crate::{UserError, UserResult};
use core::ptr::NonNull;
use magring_hal::{VirtAddr, PAGE_SIZE};

/// Access to the `ring` system call and to the caller's memory
pub trait RingSys {
    /// `ring(name, flag)`: the mapped base, 0 after a detach, or -1
    fn ring(&self, name: &[u8], flag: i32) -> isize;

    /// Pointer through which the caller reaches the byte at `va`.
    ///
    /// The pointer is valid up to the end of `va`'s page.
    fn resolve(&self, va: VirtAddr) -> Option<NonNull<u8>> {
        NonNull::new(va.as_mut_ptr::<u8>())
    }
}

impl<S: RingSys + ?Sized> RingSys for &S {
    fn ring(&self, name: &[u8], flag: i32) -> isize {
        (**self).ring(name, flag)
    }

    fn resolve(&self, va: VirtAddr) -> Option<NonNull<u8>> {
        (**self).resolve(va)
    }
}

/// Visit `len` bytes at `va` in chunks that never cross a page.
fn for_each_chunk<S, F>(sys: &S, va: VirtAddr, len: usize, mut f: F) -> UserResult<()>
where
    S: RingSys + ?Sized,
    F: FnMut(*mut u8, usize, usize),
{
    let mut done = 0;
    while done < len {
        let at = va.add(done as u64);
        let n = (PAGE_SIZE - at.page_offset()).min(len - done);
        let ptr = sys.resolve(at).ok_or(UserError::BadAddress)?;
        f(ptr.as_ptr(), done, n);
        done += n;
    }
    Ok(())
}

/// Copy `src` to `va` in the caller's memory
pub fn write_user<S: RingSys + ?Sized>(sys: &S, va: VirtAddr, src: &[u8]) -> UserResult<()> {
    for_each_chunk(sys, va, src.len(), |dst, done, n| {
        // SAFETY: `resolve` vouches for `n` bytes at `dst`; `src` is ours.
        unsafe { core::ptr::copy_nonoverlapping(src[done..].as_ptr(), dst, n) };
    })
}

/// Copy from `va` in the caller's memory into `dst`
pub fn read_user<S: RingSys + ?Sized>(sys: &S, va: VirtAddr, dst: &mut [u8]) -> UserResult<()> {
    let len = dst.len();
    for_each_chunk(sys, va, len, |src, done, n| {
        // SAFETY: as in `write_user`.
        unsafe { core::ptr::copy_nonoverlapping(src, dst[done..].as_mut_ptr(), n) };
    })
}
