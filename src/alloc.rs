//! `malloc`/`realloc`/`free`: the five-step per-region allocation sequence (trigger check,
//! freelist pop, mark-window harvest, bump allocation, commit-on-demand) this design is built
//! around, plus the lazy harvest that turns a completed sweep's leftover `[markstartptr,
//! markendptr)` window into freelist nodes only as the allocator actually needs them.

use log::trace;

use crate::address::{self, Address};
use crate::constants::PAGE;
use crate::error;
use crate::heap::{self, Heap};
use crate::region::{self, Region};
use crate::vm;

/// Pops the head of `region`'s freelist, un-hiding its stored `next` link. Returns `None` if the
/// freelist is empty.
fn pop_freelist(region: &Region) -> Option<Address> {
    let head = region.freelist.get();
    if head.is_zero() {
        return None;
    }
    let hidden_next = unsafe { head.load_word() };
    region.freelist.set(Address::from_usize(hidden_next).unhide());
    Some(head)
}

/// Pushes `ptr` onto `region`'s freelist, hiding the link so a conservative scan of this slot's
/// contents can never mistake it for a live reference.
fn push_freelist(region: &Region, ptr: Address) {
    let old_head = region.freelist.get();
    unsafe {
        std::ptr::write_unaligned(ptr.to_mut_ptr::<usize>(), old_head.hide().as_usize());
    }
    region.freelist.set(ptr);
}

/// Pulls up to `freelist_len` unmarked slots out of the region's leftover mark window onto its
/// freelist, advancing `markstartptr` over everything visited (marked or not). Returns whether
/// anything was harvested.
fn harvest(freelist_len: usize, region: &Region) -> bool {
    let mut ptr = region.markstartptr.get();
    let end = region.markendptr.get();
    if ptr >= end {
        return false;
    }
    let mut idx = address::object_index(ptr, region.inv_size) - region.startidx;
    let mut harvested = false;
    let mut count = 0usize;
    while count < freelist_len && ptr < end {
        // Safety: every slot in [markstartptr, markendptr) is within the committed bitmap this
        // region's mark phase prepared (see `crate::mark::mark_init`).
        if unsafe { !region.is_marked(idx) } {
            push_freelist(region, ptr);
            harvested = true;
            count += 1;
        }
        ptr = ptr + region.size;
        idx += 1;
    }
    region.markstartptr.set(ptr);
    harvested
}

/// Allocates one object from region `idx`, running a collection first if the trigger has been
/// crossed and collection is enabled. Returns `Address::ZERO` on out-of-memory or commit failure,
/// after the error callback (if any) has had a chance to run.
pub fn malloc_index(heap: &Heap, idx: usize) -> Address {
    let region = heap.regions.get(idx);

    heap::maybe_collect(heap, region.size);

    if let Some(ptr) = pop_freelist(region) {
        return ptr;
    }

    if harvest(heap.config.freelist_len, region) {
        if let Some(ptr) = pop_freelist(region) {
            return ptr;
        }
    }

    let ptr = region.freeptr.get();
    region.freeptr.set(ptr + region.size);
    if ptr >= region.endptr {
        trace!("cgc: region size={} out of memory", region.size);
        error::handle_error(false, libc::ENOMEM);
        return Address::ZERO;
    }

    if ptr + region.size >= region.protectptr.get() {
        let protectptr = region.protectptr.get();
        let protectlen = (heap.config.protect_len * PAGE).max(region.size);
        if let Err(e) = vm::commit(protectptr, protectlen) {
            trace!("cgc: commit failed at {protectptr}: {e}");
            error::handle_error(false, 0);
            return Address::ZERO;
        }
        region.protectptr.set(protectptr + protectlen);
    }

    ptr
}

/// Maps a byte size to a region and allocates from it. A size of zero or greater than this
/// collector's largest class is a fatal `EINVAL`, matching `malloc`'s C counterpart (which
/// reaches the same fatal path via an unsigned-subtraction underflow for zero).
pub fn malloc(heap: &Heap, size: usize) -> Address {
    match region::size_to_index(size) {
        Some(idx) => malloc_index(heap, idx),
        None => {
            error::handle_error(true, libc::EINVAL);
            Address::ZERO
        }
    }
}

/// `realloc`: null `ptr` behaves as `malloc`; a same-class request returns `ptr` unchanged;
/// otherwise allocates fresh, copies the overlapping prefix, and frees the old slot.
pub fn realloc(heap: &Heap, ptr: Address, size: usize) -> Address {
    if ptr.is_zero() {
        return malloc(heap, size);
    }
    let idx_size = match region::size_to_index(size) {
        Some(idx) => idx,
        None => {
            error::handle_error(true, libc::EINVAL);
            return Address::ZERO;
        }
    };
    let idx_ptr = address::region_index(ptr);
    if idx_size == idx_ptr {
        return ptr;
    }
    let newptr = malloc_index(heap, idx_size);
    if newptr.is_zero() {
        return Address::ZERO;
    }
    let old_region = heap.regions.get(idx_ptr);
    let copy_size = size.min(old_region.size);
    unsafe {
        std::ptr::copy_nonoverlapping(ptr.to_ptr::<u8>(), newptr.to_mut_ptr::<u8>(), copy_size);
    }
    free(heap, ptr);
    newptr
}

/// `free`: pushes `ptr` onto its region's freelist. Null is a no-op; an out-of-reservation
/// pointer is also a no-op (this crate's one deviation from the zero-validation original — see
/// `DESIGN.md` — since the alternative is an out-of-bounds region-table index rather than the
/// silent corruption the original accepts). A double-free still silently corrupts that region's
/// freelist, exactly as documented.
pub fn free(heap: &Heap, ptr: Address) {
    if ptr.is_zero() || !address::is_reserved_ptr(ptr) {
        return;
    }
    let idx = address::region_index(ptr);
    let region = heap.regions.get(idx);
    push_freelist(region, ptr);
}

/// GC-allocated copy of a NUL-terminated C string.
pub fn strdup(heap: &Heap, s: &std::ffi::CStr) -> Address {
    let bytes = s.to_bytes_with_nul();
    let ptr = malloc(heap, bytes.len());
    if !ptr.is_zero() {
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.to_mut_ptr::<u8>(), bytes.len());
        }
    }
    ptr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freelist_push_pop_is_lifo_and_hides_links() {
        let regions = region::RegionTable::new();
        let region = regions.get(0);

        // push_freelist/pop_freelist only read and write the first word at the address they're
        // given; any writable memory works as a stand-in for two real, committed slots, without
        // this test needing the fixed-address heap reservation `crate::heap::init` sets up.
        let scratch = vm::reserve_committed_anywhere(region.size * 2).expect("scratch reservation");
        let a = scratch;
        let b = scratch + region.size;

        push_freelist(region, a);
        push_freelist(region, b);

        // The stored hidden link must never look like a pointer into the reservation.
        let stored = unsafe { b.load_word() };
        assert!(!address::is_reserved_ptr(Address::from_usize(stored)));

        assert_eq!(pop_freelist(region), Some(b));
        assert_eq!(pop_freelist(region), Some(a));
        assert_eq!(pop_freelist(region), None);
    }
}
