//! # Ring Handle Table
//!
//! A process names rings by small integers, like file descriptors. The
//! table remembers where each attached ring was mapped; attaching a name
//! that is already in the table hands back the same handle without asking
//! the kernel again.

use crate::ring::Ring;
use crate::sys::RingSys;
use crate::{UserError, UserResult};
use magring::{Bookkeeping, RingMode, RingName, MAX_RINGS, RING_CAPACITY};
use magring_hal::VirtAddr;
use static_assertions::const_assert;

/// Handles a process can hold at once
pub const MAX_LOCAL_RINGS: usize = MAX_RINGS;

const_assert!(MAX_LOCAL_RINGS > 0);

/// Handle to an attached ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingDesc(usize);

impl RingDesc {
    /// Raw handle number
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct Entry {
    name: RingName,
    buffer: VirtAddr,
    book: VirtAddr,
}

/// Per-process ring handle table
#[derive(Debug)]
pub struct RingTable<S: RingSys> {
    sys: S,
    entries: [Option<Entry>; MAX_LOCAL_RINGS],
}

impl<S: RingSys> RingTable<S> {
    /// Empty table issuing system calls through `sys`
    pub fn new(sys: S) -> Self {
        Self {
            sys,
            entries: core::array::from_fn(|_| None),
        }
    }

    /// The kernel seam
    pub fn sys(&self) -> &S {
        &self.sys
    }

    /// Attach to the ring called `name`, creating it if needed
    pub fn attach(&mut self, name: &[u8]) -> UserResult<RingDesc> {
        let name = RingName::new(name);
        if let Some(index) = self.position(&name) {
            return Ok(RingDesc(index));
        }

        let index = self
            .entries
            .iter()
            .position(Option::is_none)
            .ok_or(UserError::NoLocalSlots)?;

        let ret = self.sys.ring(name.as_bytes(), RingMode::CreateOrAttach.flag());
        if ret < 0 {
            log::warn!("attach {}: ring system call failed", name);
            return Err(UserError::Syscall);
        }
        let buffer = VirtAddr::new(ret as u64);
        log::debug!("attach {}: handle {} at {:#x}", name, index, buffer);

        self.entries[index] = Some(Entry {
            name,
            buffer,
            book: buffer.add(RING_CAPACITY as u64),
        });
        Ok(RingDesc(index))
    }

    /// Detach the ring behind `desc`. The handle becomes free for reuse.
    pub fn detach(&mut self, desc: RingDesc) -> UserResult<()> {
        let entry = self
            .entries
            .get_mut(desc.0)
            .and_then(Option::take)
            .ok_or(UserError::NotAttached)?;

        if self.sys.ring(entry.name.as_bytes(), RingMode::Detach.flag()) < 0 {
            log::warn!("detach {}: ring system call failed", entry.name);
            return Err(UserError::Syscall);
        }
        log::debug!("detach {}: handle {} released", entry.name, desc.0);
        Ok(())
    }

    /// Handle already held for `name`
    pub fn lookup(&self, name: &[u8]) -> Option<RingDesc> {
        self.position(&RingName::new(name)).map(RingDesc)
    }

    fn position(&self, name: &RingName) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.as_ref().is_some_and(|e| &e.name == name))
    }

    /// Flow-control view of the ring behind `desc`
    pub fn ring(&self, desc: RingDesc) -> UserResult<Ring<'_, S>> {
        let entry = self
            .entries
            .get(desc.0)
            .and_then(Option::as_ref)
            .ok_or(UserError::NotAttached)?;
        let book = self.sys.resolve(entry.book).ok_or(UserError::BadAddress)?;

        // SAFETY: the kernel mapped a bookkeeping page at `entry.book` and
        // one page of data behind every page of the buffer. Both stay mapped
        // until `detach`, which needs `&mut self`. The page is page-aligned
        // and holds only atomics.
        unsafe {
            let book = &*book.as_ptr().cast::<Bookkeeping>();
            Ok(Ring::from_raw(&self.sys, entry.buffer, book, RING_CAPACITY))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records calls; hands out fake bases
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<(Vec<u8>, i32)>>,
        fail: bool,
    }

    impl RingSys for Recorder {
        fn ring(&self, name: &[u8], flag: i32) -> isize {
            let mut calls = self.calls.borrow_mut();
            calls.push((name.to_vec(), flag));
            if self.fail {
                -1
            } else if flag != 0 {
                0x10_0000 * calls.len() as isize
            } else {
                0
            }
        }

        fn resolve(&self, _va: VirtAddr) -> Option<core::ptr::NonNull<u8>> {
            None
        }
    }

    #[test]
    fn test_reattach_reuses_handle() {
        let mut table = RingTable::new(Recorder::default());
        let a = table.attach(b"magic!").unwrap();
        let b = table.attach(b"magic!").unwrap();

        assert_eq!(a, b);
        assert_eq!(table.sys().calls.borrow().len(), 1);
        assert_eq!(table.lookup(b"magic!"), Some(a));
    }

    #[test]
    fn test_no_local_slots() {
        let mut table = RingTable::new(Recorder::default());
        for i in 0..MAX_LOCAL_RINGS {
            table.attach(&[b'r', b'0' + i as u8]).unwrap();
        }
        assert_eq!(table.attach(b"extra"), Err(UserError::NoLocalSlots));
        assert_eq!(table.sys().calls.borrow().len(), MAX_LOCAL_RINGS);
    }

    #[test]
    fn test_double_detach_rejected() {
        let mut table = RingTable::new(Recorder::default());
        let desc = table.attach(b"rb").unwrap();

        table.detach(desc).unwrap();
        assert_eq!(table.detach(desc), Err(UserError::NotAttached));
        assert_eq!(table.detach(RingDesc(MAX_LOCAL_RINGS)), Err(UserError::NotAttached));

        let calls = table.sys().calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], (b"rb".to_vec(), 0));
    }

    #[test]
    fn test_freed_handle_is_reused() {
        let mut table = RingTable::new(Recorder::default());
        let a = table.attach(b"a").unwrap();
        table.attach(b"b").unwrap();
        table.detach(a).unwrap();

        assert_eq!(table.attach(b"c").unwrap(), a);
        assert_eq!(table.lookup(b"a"), None);
    }

    #[test]
    fn test_kernel_failure_leaves_slot_free() {
        let mut table = RingTable::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        assert_eq!(table.attach(b"rb"), Err(UserError::Syscall));
        assert_eq!(table.lookup(b"rb"), None);
    }

    #[test]
    fn test_unresolvable_bookkeeping() {
        let mut table = RingTable::new(Recorder::default());
        let desc = table.attach(b"rb").unwrap();
        assert!(matches!(table.ring(desc), Err(UserError::BadAddress)));
        assert!(matches!(table.ring(RingDesc(3)), Err(UserError::NotAttached)));
    }
}
