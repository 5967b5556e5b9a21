//! Raw address arithmetic: the pointer/region/slot mapping the whole collector is built on.
//!
//! There are no per-object headers anywhere in this crate. Every operation here is a pure,
//! branch-light function of an address and a region's precomputed constants; interior pointers
//! are resolved back to their owning slot by a single reciprocal multiply rather than a scan.

use std::fmt;
use std::ops::{Add, Sub};

use crate::constants::{NUM_REGIONS, REGION_SIZE};

/// A raw address into the process's address space.
///
/// Stored as a `usize` rather than a raw pointer so it can be freely compared, hashed, and
/// stuffed into bitmaps without the aliasing baggage of `*mut u8`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Address(usize);

impl Address {
    pub const ZERO: Address = Address(0);

    #[inline(always)]
    pub fn from_ptr<T>(ptr: *const T) -> Address {
        Address(ptr as usize)
    }

    #[inline(always)]
    pub fn from_mut_ptr<T>(ptr: *mut T) -> Address {
        Address(ptr as usize)
    }

    #[inline(always)]
    pub fn from_usize(v: usize) -> Address {
        Address(v)
    }

    #[inline(always)]
    pub fn as_usize(self) -> usize {
        self.0
    }

    #[inline(always)]
    pub fn to_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    #[inline(always)]
    pub fn to_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    #[inline(always)]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Bitwise complement, used to hide freelist links from the conservative marker.
    #[inline(always)]
    pub fn hide(self) -> Address {
        Address(!self.0)
    }

    /// Inverse of [`Address::hide`].
    #[inline(always)]
    pub fn unhide(self) -> Address {
        Address(!self.0)
    }

    #[inline(always)]
    pub fn align_up(self, align: usize) -> Address {
        debug_assert!(align.is_power_of_two());
        Address((self.0 + align - 1) & !(align - 1))
    }

    #[inline(always)]
    pub fn align_down(self, align: usize) -> Address {
        debug_assert!(align.is_power_of_two());
        Address(self.0 & !(align - 1))
    }

    #[inline(always)]
    pub fn is_aligned_to(self, align: usize) -> bool {
        debug_assert!(align.is_power_of_two());
        (self.0 & (align - 1)) == 0
    }

    /// Reads a word at this address without any bounds checking.
    ///
    /// # Safety
    /// The caller must ensure `self` points at `size_of::<usize>()` readable bytes.
    #[inline(always)]
    pub unsafe fn load_word(self) -> usize {
        std::ptr::read_unaligned(self.0 as *const usize)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Add<usize> for Address {
    type Output = Address;
    #[inline(always)]
    fn add(self, rhs: usize) -> Address {
        Address(self.0 + rhs)
    }
}

impl Sub<usize> for Address {
    type Output = Address;
    #[inline(always)]
    fn sub(self, rhs: usize) -> Address {
        Address(self.0 - rhs)
    }
}

impl Sub<Address> for Address {
    type Output = usize;
    #[inline(always)]
    fn sub(self, rhs: Address) -> usize {
        self.0 - rhs.0
    }
}

/// Fixed base of the single contiguous reservation backing every region.
///
/// Chosen the way the collector this crate is modeled on chose its own fixed base: a high,
/// unremarkable address unlikely to collide with the binary, the stack, or the loader's own
/// mappings. Platforms that refuse a fixed-address reservation at this address fail `init`
/// and the caller can retry with ASLR-friendly behavior disabled, or the constant can be
/// changed and the crate rebuilt.
pub const BASE: Address = Address(0x200_0000_0000);

/// `true` iff `p` falls within the single reservation `[BASE, BASE + NUM_REGIONS*REGION_SIZE)`.
///
/// This is the entirety of the conservative "does this word look like a pointer" test: a single
/// unsigned subtraction and comparison. Arbitrary bit patterns, including `NULL` and scalars that
/// happen to look like addresses, are correctly rejected because the subtraction underflows (in
/// wrapping arithmetic) into a huge value that fails the upper-bound comparison.
#[inline(always)]
pub fn is_reserved_ptr(p: Address) -> bool {
    p.as_usize().wrapping_sub(BASE.as_usize()) < NUM_REGIONS * REGION_SIZE
}

/// Index of the region containing `p`. Caller must have already checked [`is_reserved_ptr`].
#[inline(always)]
pub fn region_index(p: Address) -> usize {
    (p.as_usize() - BASE.as_usize()) / REGION_SIZE
}

/// Recovers `p / size` via a single 128-bit multiply by the region's precomputed reciprocal,
/// rather than an integer division on every marked word.
///
/// `inv_size` must equal `ceil(2^64 / size)` for the region's object size. This holds because
/// every address in the region is a multiple of `size` below `2^64`, so truncating the high
/// 64 bits of `inv_size * p` always yields the exact quotient `p / size`.
#[inline(always)]
pub fn object_index(p: Address, inv_size: u64) -> usize {
    (((p.as_usize() as u128) * (inv_size as u128)) >> 64) as usize
}

/// Recovers the start of the slot containing `p`: the defining trick that lets any interior
/// pointer into a live object be treated as if it were the object's own base pointer.
#[inline(always)]
pub fn slot_base(p: Address, inv_size: u64, size: usize) -> Address {
    Address(object_index(p, inv_size) * size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_down() {
        assert_eq!(Address::from_usize(0x1001).align_up(16).as_usize(), 0x1010);
        assert_eq!(Address::from_usize(0x1010).align_up(16).as_usize(), 0x1010);
        assert_eq!(Address::from_usize(0x1017).align_down(16).as_usize(), 0x1010);
    }

    #[test]
    fn hide_unhide_roundtrip() {
        let a = Address::from_usize(0x1234_5678);
        assert_eq!(a.hide().unhide(), a);
    }

    #[test]
    fn hidden_pointer_is_never_a_reserved_ptr() {
        // Any in-reservation address, once hidden, no longer satisfies is_reserved_ptr:
        // its complement is a huge value far outside [BASE, BASE + N*REGION_SIZE).
        let a = BASE + 0x1000;
        assert!(is_reserved_ptr(a));
        assert!(!is_reserved_ptr(a.hide()));
    }

    #[test]
    fn is_reserved_ptr_rejects_out_of_range() {
        assert!(!is_reserved_ptr(Address::ZERO));
        assert!(!is_reserved_ptr(Address::from_usize(0xdead_beef)));
        assert!(is_reserved_ptr(BASE));
        assert!(!is_reserved_ptr(BASE + (NUM_REGIONS * REGION_SIZE)));
    }

    #[test]
    fn region_index_is_monotonic_within_bounds() {
        assert_eq!(region_index(BASE), 0);
        assert_eq!(region_index(BASE + (REGION_SIZE + 5)), 1);
    }

    #[test]
    fn object_index_and_slot_base_roundtrip() {
        let size: usize = 64;
        let inv_size = (u64::MAX / size as u64) + 1;
        let base = BASE + 7 * size;
        for offset in 0..size {
            let p = base + offset;
            assert_eq!(slot_base(p, inv_size, size), base);
        }
    }
}
