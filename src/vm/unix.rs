//! Unix virtual memory backend: `mmap`/`mprotect`/`madvise`/`munmap` via `libc`.

use std::io;

use log::{debug, trace};

use crate::address::Address;
use crate::constants::PAGE;
use crate::error::InitError;
use crate::vm::VmResult;

fn wrap_libc_call<T: PartialEq>(f: &dyn Fn() -> T, expect: T) -> Result<(), io::Error> {
    let ret = f();
    if ret == expect {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Reserves `len` bytes at the fixed address `addr` with no access permissions. The mapping
/// exists (so nothing else can be placed there) but touching it faults until [`commit`] runs.
pub fn reserve(addr: Address, len: usize) -> VmResult {
    trace!("cgc: reserving {len} bytes at {addr}");
    let ptr = unsafe {
        libc::mmap(
            addr.to_mut_ptr(),
            len,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_NORESERVE | libc::MAP_FIXED,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Makes `[addr, addr+len)` readable and writable, committing physical pages on first touch.
pub fn commit(addr: Address, len: usize) -> VmResult {
    trace!("cgc: committing {len} bytes at {addr}");
    wrap_libc_call(
        &|| unsafe { libc::mprotect(addr.to_mut_ptr(), len, libc::PROT_READ | libc::PROT_WRITE) },
        0,
    )
}

/// Drops the physical pages backing `[addr, addr+len)` and returns the range to no-access, so a
/// later [`commit`] sees zero-filled memory again.
pub fn decommit(addr: Address, len: usize) -> VmResult {
    trace!("cgc: decommitting {len} bytes at {addr}");
    wrap_libc_call(
        &|| unsafe { libc::madvise(addr.to_mut_ptr(), len, libc::MADV_DONTNEED) },
        0,
    )?;
    wrap_libc_call(
        &|| unsafe { libc::mprotect(addr.to_mut_ptr(), len, libc::PROT_NONE) },
        0,
    )
}

/// Releases the reservation at `[addr, addr+len)` entirely.
pub fn release(addr: Address, len: usize) -> VmResult {
    debug!("cgc: releasing {len} bytes at {addr}");
    wrap_libc_call(&|| unsafe { libc::munmap(addr.to_mut_ptr(), len) }, 0)
}

/// Reserves `len` bytes anywhere the kernel chooses, already readable and writable.
///
/// Unlike [`reserve`], the mapping is backed by `PROT_READ | PROT_WRITE` from the start: used for
/// scratch memory that is never part of the managed heap (the mark stack, per-region mark
/// bitmaps), so there is no separate commit-on-demand phase to stage.
pub fn reserve_committed_anywhere(len: usize) -> Result<Address, io::Error> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_NORESERVE,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        Err(io::Error::last_os_error())
    } else {
        Ok(Address::from_mut_ptr(ptr))
    }
}

/// Drops the physical pages backing `[addr, addr+len)` without changing protection, so a
/// subsequent read sees zero-filled memory again. Used to re-zero a mark bitmap between
/// collections; unlike [`decommit`] this never touches `PROT_NONE`, since this memory was never
/// protected in the first place (see [`reserve_committed_anywhere`]).
pub fn zero(addr: Address, len: usize) -> VmResult {
    wrap_libc_call(
        &|| unsafe { libc::madvise(addr.to_mut_ptr(), len, libc::MADV_DONTNEED) },
        0,
    )
}

/// Address of a local in the calling frame. Marked `#[inline(never)]` so the compiler cannot
/// elide the frame and so any register-resident arguments/locals of the *caller* are spilled to
/// the stack before this call, making them visible to a subsequent stack scan.
#[inline(never)]
pub fn stack_top() -> Address {
    let dummy: u8 = 0;
    Address::from_ptr(&dummy)
}

/// Walks upward from the current stack top in page-sized strides, using `mincore` to find the
/// first page that is not resident, i.e. the page beyond the top of the mapped stack region.
/// One word below that boundary is treated as the stack bottom.
///
/// Any `mincore` failure other than `ENOMEM` (which `mincore` reports for an address past the
/// end of a mapping, exactly the terminating condition this walk is looking for) is surfaced as
/// a fatal [`InitError::StackBottom`] rather than silently guessed at.
pub fn discover_stack_bottom() -> Result<Address, InitError> {
    let top = stack_top();
    let mut page = top.align_down(PAGE);
    let mut vec: [u8; 1] = [0];
    loop {
        let next = page + PAGE;
        let ret = unsafe { libc::mincore(next.to_mut_ptr(), PAGE, vec.as_mut_ptr()) };
        if ret == 0 {
            page = next;
            continue;
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOMEM) {
            // `next` is unmapped: the stack ends somewhere in `page`'s page.
            return Ok(next - std::mem::size_of::<usize>());
        }
        return Err(InitError::StackBottom(err));
    }
}
