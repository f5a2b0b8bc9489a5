//! Binds a host process to the user library's kernel seam.

use core::ptr::NonNull;
use magring::host::HostProcess;
use magring_hal::VirtAddr;
use magring_user::RingSys;

/// A [`HostProcess`] issuing system calls for a [`magring_user::RingTable`]
#[derive(Debug)]
pub struct HostSys(pub HostProcess);

impl RingSys for HostSys {
    fn ring(&self, name: &[u8], flag: i32) -> isize {
        self.0.sys_ring(name, flag)
    }

    fn resolve(&self, va: VirtAddr) -> Option<NonNull<u8>> {
        self.0.resolve(va)
    }
}
