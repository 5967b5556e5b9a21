//! The mark engine: a conservative, root-driven scan of every live slot, backed by an explicit,
//! bounded stack of `(start, end)` pointer-range frames rather than native recursion.
//!
//! Native recursion has no bound on conservative fan-out (a slot can "contain" any number of
//! apparent pointers), so this walks a worklist instead. The worklist lives in its own dedicated
//! virtual reservation (default 1 GiB) rather than a growable `Vec`, so mark-phase memory use is
//! capped independently of how deep or wide the live object graph turns out to be. A slot is
//! pushed onto the mark bitmap's fixpoint at most once (`mark_bit` returns `false` the second
//! time), so cyclic structures need no separate detection.

use log::{debug, trace};

use crate::address::{self, Address};
use crate::constants::{MARK_STACK_SIZE, MAX_MARK_PUSH, PAGE};
use crate::error;
use crate::region::RegionTable;
use crate::vm;

const FRAME_WORDS: usize = 2;
const FRAME_SIZE: usize = FRAME_WORDS * std::mem::size_of::<usize>();

#[derive(Copy, Clone)]
struct Frame {
    start: Address,
    end: Address,
}

/// The explicit, bounded work stack of pointer-range frames that drives conservative marking.
///
/// Frames grow downward from the top of a dedicated reservation, exactly mirroring the layout
/// this collector's mark phase is built around: a sentinel frame (`start == end == 0`) always
/// occupies the top slot and is never popped, so "stack exhausted, nothing left to scan" and
/// "genuinely reached a zero frame" cannot be confused — the collector never hands out a null
/// slot, and no root ever presents one.
pub struct MarkStack {
    base: Address,
    cap: usize,
    sp: std::cell::Cell<usize>,
}

impl MarkStack {
    pub fn new() -> Result<MarkStack, std::io::Error> {
        let base = vm::reserve_committed_anywhere(MARK_STACK_SIZE)?;
        let cap = MARK_STACK_SIZE / FRAME_SIZE;
        let stack = MarkStack { base, cap, sp: std::cell::Cell::new(cap - 1) };
        unsafe { stack.write(cap - 1, Address::ZERO, Address::ZERO) };
        Ok(stack)
    }

    unsafe fn write(&self, idx: usize, start: Address, end: Address) {
        let p = (self.base + idx * FRAME_SIZE).to_mut_ptr::<Frame>();
        std::ptr::write_unaligned(p, Frame { start, end });
    }

    unsafe fn read(&self, idx: usize) -> Frame {
        let p = (self.base + idx * FRAME_SIZE).to_ptr::<Frame>();
        std::ptr::read_unaligned(p)
    }

    /// Resets the stack to just the sentinel, for the start of a new collection.
    fn reset(&self) {
        self.sp.set(self.cap - 1);
        unsafe { self.write(self.cap - 1, Address::ZERO, Address::ZERO) };
    }

    /// Index the *next* [`push`](Self::push) will land on, without mutating anything. Used to
    /// remember the "bottom-most recently pushed frame" for the [`MAX_MARK_PUSH`] swap rule.
    fn next_push_index(&self) -> usize {
        self.sp.get() - 1
    }

    fn push(&self, start: Address, end: Address) {
        let idx = self.sp.get() - 1;
        debug_assert!(idx > 0, "mark stack exhausted: {} frames in flight", self.cap);
        unsafe { self.write(idx, start, end) };
        self.sp.set(idx);
    }

    /// Pops and returns the current frame, unless it is the sentinel, in which case the sentinel
    /// is left in place and `None` is returned (so callers fall through to the root list, exactly
    /// as "stack++ happens only in the non-null branch" in the design this mirrors).
    fn pop_non_sentinel(&self) -> Option<(Address, Address)> {
        let idx = self.sp.get();
        let f = unsafe { self.read(idx) };
        if f.start.is_zero() {
            None
        } else {
            self.sp.set(idx + 1);
            Some((f.start, f.end))
        }
    }

    fn read_at(&self, idx: usize) -> (Address, Address) {
        let f = unsafe { self.read(idx) };
        (f.start, f.end)
    }

    fn write_at(&self, idx: usize, start: Address, end: Address) {
        unsafe { self.write(idx, start, end) };
    }
}

const WORD: usize = std::mem::size_of::<usize>();

/// Prepares every non-empty region for a new mark phase: commits a fresh bitmap for a region
/// that has never needed one, or zeroes the portion of an existing one that covers currently
/// live slots. Returns the total byte high-water-mark across all regions, used for the next
/// trigger-size computation.
///
/// A bitmap commit failure is fatal (matching this design's "unrecoverable" tier): marking with a
/// partially-missing bitmap would silently under-mark, which is unsound, not just degraded.
pub fn mark_init(regions: &RegionTable) -> usize {
    let mut total_size = 0usize;
    for region in regions.iter() {
        let region_size = region.freeptr.get() - region.startptr;
        if region_size == 0 {
            continue;
        }
        total_size += region_size;
        let slots = region_size / region.size;

        if region.markptr.get().is_zero() {
            let marksize = crate::constants::REGION_SIZE / (region.size * 8) + PAGE;
            match vm::reserve_committed_anywhere(marksize) {
                Ok(markptr) => region.markptr.set(markptr),
                Err(e) => {
                    debug!("cgc: mark bitmap commit failed: {e}");
                    error::handle_error(true, 0);
                }
            }
        } else {
            let marksize = (slots + 7) / 8;
            if let Err(e) = vm::zero(region.markptr.get(), marksize) {
                debug!("cgc: mark bitmap zero failed: {e}");
            }
        }
    }
    total_size
}

/// Runs the full mark phase: resets the work stack, scans the stack root first (always scanned
/// before any registered root, matching this design's "stack root is prepended" rule), then every
/// registered root in LIFO order, transitively following every apparent pointer it finds. Returns
/// the number of live bytes reached.
///
/// # Safety
/// `stack_range` and every range yielded by `root_ranges` must currently be readable memory: the
/// caller (`crate::heap::collect`) is responsible for having captured them correctly.
pub unsafe fn mark(
    regions: &RegionTable,
    stack: &MarkStack,
    stack_range: (Address, Address),
    root_ranges: Vec<(Address, Address)>,
) -> usize {
    stack.reset();
    let mut live_bytes = 0usize;
    let mut roots = std::iter::once(stack_range).chain(root_ranges);

    loop {
        let (mut ptrptr, mut endptr) = match stack.pop_non_sentinel() {
            Some(frame) => frame,
            None => match roots.next() {
                Some(range) => range,
                None => break,
            },
        };
        // Floor to a whole number of words: a root registered with a size that isn't a multiple
        // of the word size must never have its last, partial word read, since that can run past
        // the end of the registered range (and, at a mapping boundary, fault).
        endptr = ptrptr + ((endptr - ptrptr) / WORD) * WORD;

        // Index of the bottom-most frame this inner loop will push, fixed for its whole
        // invocation: every time the swap rule below fires it swaps against this same slot, not
        // whatever was most recently pushed, matching the "bottom-most recently pushed" rule.
        let anchor_idx = stack.next_push_index();
        let mut pushed = 0usize;

        while ptrptr < endptr {
            let word = ptrptr.load_word();
            ptrptr = ptrptr + WORD;

            let p = Address::from_usize(word);
            if !address::is_reserved_ptr(p) {
                continue;
            }
            let idx = address::region_index(p);
            let region = regions.get(idx);
            if p >= region.freeptr.get() || p < region.startptr {
                // Not yet allocated (or, because regions never shrink their `startptr`, never
                // will be): not a live slot this collection can account for.
                continue;
            }

            let k = address::object_index(p, region.inv_size) - region.startidx;
            if !region.mark_bit(k) {
                // Already marked this collection: already on (or past) the work stack.
                continue;
            }

            live_bytes += region.size;
            let base = region.startptr + k * region.size;
            stack.push(base, base + region.size);

            if pushed > MAX_MARK_PUSH {
                // Bound how many frames can accumulate while scanning one range: hand the range
                // still being scanned off to the stack, and resume on the oldest frame this
                // invocation pushed instead. Every live slot is still visited exactly once either
                // way, since the mark bit — not stack order — is what makes this a fixpoint.
                let (anchor_start, anchor_end) = stack.read_at(anchor_idx);
                stack.write_at(anchor_idx, ptrptr, endptr);
                ptrptr = anchor_start;
                endptr = anchor_end;
                pushed = 0;
            }
            pushed += 1;
        }
    }

    trace!("cgc: mark complete, {live_bytes} live bytes");
    live_bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stack_has_only_the_sentinel() {
        let stack = MarkStack::new().expect("mark stack reservation");
        assert_eq!(stack.pop_non_sentinel(), None);
    }

    #[test]
    fn push_then_pop_roundtrips() {
        let stack = MarkStack::new().expect("mark stack reservation");
        let a = Address::from_usize(0x1000);
        let b = Address::from_usize(0x2000);
        stack.push(a, b);
        assert_eq!(stack.pop_non_sentinel(), Some((a, b)));
        assert_eq!(stack.pop_non_sentinel(), None);
    }

    #[test]
    fn reset_clears_pushed_frames() {
        let stack = MarkStack::new().expect("mark stack reservation");
        stack.push(Address::from_usize(0x1000), Address::from_usize(0x2000));
        stack.reset();
        assert_eq!(stack.pop_non_sentinel(), None);
    }
}
