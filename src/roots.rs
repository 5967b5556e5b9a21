//! The roots registry: the set of memory ranges the marker treats as always-reachable.
//!
//! Two registration forms exist. A static root copies a `(ptr, size)` pair the caller hands over
//! once; a dynamic root instead stores pointers to the *caller's own* pointer and size variables,
//! so a root whose location or extent changes between collections (a growable vector, say) stays
//! valid without re-registering it. Roots are append-only: nothing is ever removed, matching the
//! single-heap, run-to-completion lifetime this collector assumes.

use std::cell::RefCell;

use crate::address::Address;
use crate::constants::MAX_ROOT_SIZE;
use crate::error::RootError;

enum RootEntry {
    Static {
        ptr: Address,
        size: usize,
    },
    Dynamic {
        ptrptr: *mut *mut u8,
        sizeptr: *mut usize,
        elemsize: usize,
    },
}

impl RootEntry {
    /// Reads the entry's current range. For a dynamic root this dereferences the caller's own
    /// storage, so it always reflects wherever that storage currently lives.
    ///
    /// # Safety
    /// For `Dynamic` entries, `ptrptr` and `sizeptr` must still point at live, readable storage;
    /// this is the registering caller's responsibility for as long as the root is registered
    /// (roots are never unregistered, so this must hold for the lifetime of the collector).
    unsafe fn range(&self) -> (Address, Address) {
        match *self {
            RootEntry::Static { ptr, size } => (ptr, ptr + size),
            RootEntry::Dynamic { ptrptr, sizeptr, elemsize } => {
                let ptr = Address::from_mut_ptr(*ptrptr);
                let len = (*sizeptr) * elemsize;
                (ptr, ptr + len)
            }
        }
    }
}

/// The append-only list of registered roots, plus bookkeeping for LIFO mark-time scan order.
pub struct Roots {
    entries: RefCell<Vec<RootEntry>>,
}

impl Roots {
    pub fn new() -> Roots {
        Roots { entries: RefCell::new(Vec::new()) }
    }

    /// Registers a static root covering `[ptr, ptr+size)`.
    pub fn add_static(&self, ptr: Address, size: usize) -> Result<(), RootError> {
        if size > MAX_ROOT_SIZE {
            return Err(RootError::TooLarge { size, max: MAX_ROOT_SIZE });
        }
        self.entries.borrow_mut().push(RootEntry::Static { ptr, size });
        Ok(())
    }

    /// Registers a dynamic root: `*ptrptr .. *ptrptr + (*sizeptr)*elemsize` is rescanned fresh at
    /// every collection, so the caller may freely relocate or resize the underlying storage
    /// between collections as long as `ptrptr`/`sizeptr` keep pointing at valid storage.
    pub fn add_dynamic(&self, ptrptr: *mut *mut u8, sizeptr: *mut usize, elemsize: usize) {
        self.entries
            .borrow_mut()
            .push(RootEntry::Dynamic { ptrptr, sizeptr, elemsize });
    }

    /// Returns every registered root's current range, in LIFO (most-recently-registered-first)
    /// order, matching this design's scan ordering.
    ///
    /// # Safety
    /// Every dynamic root's `ptrptr`/`sizeptr` must still be valid (see [`RootEntry::range`]).
    /// Must not be called while any root could be concurrently mutated — true by construction,
    /// since this collector only ever scans roots from inside `collect`, which runs on the single
    /// mutator thread with no reentrancy.
    pub unsafe fn scan_ranges(&self) -> Vec<(Address, Address)> {
        self.entries.borrow().iter().rev().map(|e| e.range()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Default for Roots {
    fn default() -> Self {
        Roots::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_root_too_large_is_rejected() {
        let roots = Roots::new();
        let err = roots.add_static(Address::from_usize(0x1000), MAX_ROOT_SIZE + 1).unwrap_err();
        match err {
            RootError::TooLarge { size, max } => {
                assert_eq!(size, MAX_ROOT_SIZE + 1);
                assert_eq!(max, MAX_ROOT_SIZE);
            }
        }
    }

    #[test]
    fn static_root_at_the_limit_is_accepted() {
        let roots = Roots::new();
        assert!(roots.add_static(Address::from_usize(0x1000), MAX_ROOT_SIZE).is_ok());
    }

    #[test]
    fn scan_order_is_lifo() {
        let roots = Roots::new();
        roots.add_static(Address::from_usize(0x1000), 8).unwrap();
        roots.add_static(Address::from_usize(0x2000), 8).unwrap();
        roots.add_static(Address::from_usize(0x3000), 8).unwrap();
        let ranges = unsafe { roots.scan_ranges() };
        let starts: Vec<usize> = ranges.iter().map(|(s, _)| s.as_usize()).collect();
        assert_eq!(starts, vec![0x3000, 0x2000, 0x1000]);
    }

    #[test]
    fn dynamic_root_tracks_caller_storage() {
        let roots = Roots::new();
        let mut backing: *mut u8 = Address::from_usize(0x4000).to_mut_ptr();
        let mut len: usize = 4;
        roots.add_dynamic(&mut backing as *mut _, &mut len as *mut _, 8);

        let ranges = unsafe { roots.scan_ranges() };
        assert_eq!(ranges[0], (Address::from_usize(0x4000), Address::from_usize(0x4000 + 32)));

        // Simulate the caller's vector growing and relocating between collections.
        backing = Address::from_usize(0x9000).to_mut_ptr();
        len = 2;
        let ranges = unsafe { roots.scan_ranges() };
        assert_eq!(ranges[0], (Address::from_usize(0x9000), Address::from_usize(0x9000 + 16)));
    }
}
