//! Size-segregated regions: the allocator's and the sweeper's unit of bookkeeping.
//!
//! Every region owns a disjoint, fixed-size slice of the collector's single virtual reservation
//! and serves objects of exactly one size. All of a region's bookkeeping pointers after the
//! immutable geometry fields use `Cell` rather than atomics: this collector is single-threaded
//! by design (see the crate's top-level documentation), so there is nothing to synchronize.

use std::cell::Cell;

use crate::address::{Address, BASE};
use crate::constants::{self, BIG_IDX_OFFSET, HUGE_IDX_OFFSET, NUM_REGIONS, REGION_SIZE};

/// One size-segregated region of the heap.
pub struct Region {
    /// Object size served by this region, in bytes.
    pub size: usize,
    /// `ceil(2^64 / size)`, used to recover `addr / size` via a single multiply.
    pub inv_size: u64,
    /// First self-aligned slot address in this region.
    pub startptr: Address,
    /// One past the last address this region's reservation covers.
    pub endptr: Address,
    /// `object_index(startptr)`, subtracted from a slot's object index to get a 0-based slot index.
    pub startidx: usize,

    /// Bump pointer: `[startptr, freeptr)` have been handed out at least once.
    pub freeptr: Cell<Address>,
    /// `[startptr, protectptr)` is committed, read/write memory.
    pub protectptr: Cell<Address>,
    /// Head of the freelist, or `Address::ZERO` if empty. Links are hidden (bitwise complement).
    pub freelist: Cell<Address>,
    /// Window `[markstartptr, markendptr)` not yet harvested into the freelist this cycle.
    pub markstartptr: Cell<Address>,
    pub markendptr: Cell<Address>,
    /// Base of this region's mark bitmap, or `Address::ZERO` if not yet committed.
    pub markptr: Cell<Address>,
}

impl Region {
    fn uninitialized() -> Region {
        Region {
            size: 0,
            inv_size: 0,
            startptr: Address::ZERO,
            endptr: Address::ZERO,
            startidx: 0,
            freeptr: Cell::new(Address::ZERO),
            protectptr: Cell::new(Address::ZERO),
            freelist: Cell::new(Address::ZERO),
            markstartptr: Cell::new(Address::ZERO),
            markendptr: Cell::new(Address::ZERO),
            markptr: Cell::new(Address::ZERO),
        }
    }

    /// Number of slots currently in `[startptr, freeptr)`.
    #[inline]
    pub fn live_slot_count(&self) -> usize {
        (self.freeptr.get() - self.startptr) / self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.freeptr.get() == self.startptr
    }

    /// Sets bit `idx` in this region's mark bitmap. Returns `true` iff the bit was previously
    /// clear, i.e. this is the first time the marker has reached this slot during the current
    /// collection — the fixpoint check that makes cyclic structures a non-issue (see crate docs).
    ///
    /// # Safety
    /// `idx` must be `< (endptr - startptr) / size`, and `markptr` must already be committed
    /// (true for every region this is called on, since marking only visits regions with
    /// `freeptr > startptr`, and [`crate::mark::mark_init`] commits a bitmap for all of those).
    #[inline]
    pub unsafe fn mark_bit(&self, idx: usize) -> bool {
        let bits = usize::BITS as usize;
        let word_addr = self.markptr.get() + (idx / bits) * std::mem::size_of::<usize>();
        let mask = 1usize << (idx % bits);
        let word = std::ptr::read_unaligned(word_addr.to_ptr::<usize>());
        if word & mask != 0 {
            return false;
        }
        std::ptr::write_unaligned(word_addr.to_mut_ptr::<usize>(), word | mask);
        true
    }

    /// Reads bit `idx` in this region's mark bitmap without setting it. Same safety contract as
    /// [`Region::mark_bit`].
    #[inline]
    pub unsafe fn is_marked(&self, idx: usize) -> bool {
        let bits = usize::BITS as usize;
        let word_addr = self.markptr.get() + (idx / bits) * std::mem::size_of::<usize>();
        let word = std::ptr::read_unaligned(word_addr.to_ptr::<usize>());
        (word & (1usize << (idx % bits))) != 0
    }
}

/// Which size class region index `i` belongs to, and the byte step within that class.
fn unit_for_index(i: usize) -> usize {
    if i < BIG_IDX_OFFSET {
        constants::UNIT
    } else if i < HUGE_IDX_OFFSET {
        constants::BIG_UNIT
    } else {
        constants::HUGE_UNIT
    }
}

fn offset_for_unit(unit: usize) -> usize {
    if unit == constants::UNIT {
        0
    } else if unit == constants::BIG_UNIT {
        BIG_IDX_OFFSET
    } else {
        HUGE_IDX_OFFSET
    }
}

/// Maps a requested allocation size to the region index that serves it.
///
/// Returns `None` if `size` is zero or exceeds the largest class this collector can serve.
pub fn size_to_index(size: usize) -> Option<usize> {
    if size == 0 || size > constants::MAX_ALLOC_SIZE {
        return None;
    }
    let (unit, offset) = if size <= BIG_IDX_OFFSET * constants::UNIT {
        (constants::UNIT, 0)
    } else if size <= (HUGE_IDX_OFFSET - BIG_IDX_OFFSET) * constants::BIG_UNIT {
        (constants::BIG_UNIT, BIG_IDX_OFFSET)
    } else {
        (constants::HUGE_UNIT, HUGE_IDX_OFFSET)
    };
    Some((size - 1) / unit + offset)
}

/// The full region table: one entry per size class, spanning the whole reservation.
pub struct RegionTable {
    regions: Vec<Region>,
}

impl RegionTable {
    /// Builds the region table's in-memory descriptors. Does not touch virtual memory itself;
    /// the caller (see `crate::heap::init`) is responsible for reserving `[BASE, BASE +
    /// NUM_REGIONS*REGION_SIZE)` before any region's `startptr` is dereferenced.
    pub fn new() -> RegionTable {
        let mut regions = Vec::with_capacity(NUM_REGIONS);
        for i in 0..NUM_REGIONS {
            let mut r = Region::uninitialized();
            let unit = unit_for_index(i);
            let offset = offset_for_unit(unit);
            let size = (i - offset) * unit + unit;
            let region_base = BASE + i * REGION_SIZE;
            let startptr = region_base.align_up(size);
            let endptr = BASE + (i + 1) * REGION_SIZE;
            let inv_size = (u64::MAX / size as u64) + 1;

            r.size = size;
            r.inv_size = inv_size;
            r.startptr = startptr;
            r.endptr = endptr;
            r.startidx = crate::address::object_index(startptr, inv_size);
            r.freeptr.set(startptr);
            r.protectptr.set(startptr);
            r.markstartptr.set(startptr);
            r.markendptr.set(startptr);

            regions.push(r);
        }
        RegionTable { regions }
    }

    #[inline]
    pub fn get(&self, idx: usize) -> &Region {
        &self.regions[idx]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_to_index_is_monotonic() {
        assert_eq!(size_to_index(1), Some(0));
        assert_eq!(size_to_index(constants::UNIT), Some(0));
        assert_eq!(size_to_index(constants::UNIT + 1), Some(1));
        assert_eq!(size_to_index(0), None);
        assert_eq!(size_to_index(constants::MAX_ALLOC_SIZE + 1), None);
    }

    #[test]
    fn region_table_geometry_is_self_consistent() {
        let table = RegionTable::new();
        assert_eq!(table.len(), NUM_REGIONS);
        for r in table.iter() {
            assert_eq!(r.startptr.as_usize() % r.size, 0);
            assert_eq!(r.startidx, crate::address::object_index(r.startptr, r.inv_size));
            assert!(r.startptr.as_usize() < r.endptr.as_usize());
            assert!(r.size > 0);
        }
    }

    use paste::paste;

    // One test per size-class transition, generated rather than hand-duplicated: a request of
    // exactly `$cutoff` bytes (the last size still served by the smaller class) must land in the
    // last region of that class, and one byte more must land in the first region of the next.
    // The next class's first region is `$last_idx + 2`, not `$last_idx + 1`: crossing the cutoff
    // changes both the class's offset *and* its unit, so the new unit's own `(size-1)/unit`
    // division contributes 1 in addition to the offset step.
    macro_rules! test_class_transition {
        ($name:ident, $cutoff:expr, $last_idx:expr) => {
            paste! {
                #[test]
                fn [<$name _class_transition>]() {
                    let at_cutoff = size_to_index($cutoff).unwrap();
                    let just_above = size_to_index($cutoff + 1).unwrap();
                    assert_eq!(at_cutoff, $last_idx);
                    assert_eq!(just_above, $last_idx + 2);
                }
            }
        };
    }

    test_class_transition!(small_to_big, constants::BIG_UNIT, BIG_IDX_OFFSET - 1);
    test_class_transition!(big_to_huge, constants::HUGE_UNIT, HUGE_IDX_OFFSET - 1);
}
