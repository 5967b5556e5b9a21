//! The process-global collector: one heap, reachable from anywhere, since this design has no
//! notion of more than one GC instance coexisting in a process.
//!
//! `Heap` is built once, by [`crate::init`], into a lazily-constructed static cell. The
//! construction itself is fallible (it reserves real address space), so this cannot be a plain
//! `lazy_static!`-initialized value the way a zero-cost default would be; instead the static holds
//! an `Option<Heap>` behind an `UnsafeCell`, written exactly once by `init`, and `unsafe impl Sync`
//! asserts what's true by construction: this collector is never driven from more than one thread,
//! so there is nothing here that actually needs synchronizing. This mirrors how `mmtk-core` wraps
//! its own global `Options` (see `UnsafeOptionsWrapper`) for the same reason.

use std::cell::{Cell, UnsafeCell};
use std::sync::atomic::{AtomicBool, Ordering};

use lazy_static::lazy_static;
use log::{debug, info};

use crate::address::{self, Address};
use crate::config::Config;
use crate::constants;
use crate::error::InitError;
use crate::mark::{self, MarkStack};
use crate::region::RegionTable;
use crate::roots::Roots;
use crate::vm;

/// All state this collector needs, built once by [`init`].
pub struct Heap {
    pub regions: RegionTable,
    pub roots: Roots,
    pub mark_stack: MarkStack,
    pub config: Config,
    /// Whether `maybe_collect` is allowed to actually run a collection; see [`crate::enable`]/
    /// [`crate::disable`].
    pub enabled: Cell<bool>,
    pub stack_bottom: Cell<Address>,
    /// Bytes allocated since the last recomputation of `trigger_size`.
    pub alloc_since_gc: Cell<usize>,
    /// `alloc_since_gc` crossing this many bytes triggers the next collection.
    pub trigger_size: Cell<usize>,
    /// Live bytes reached by the most recently completed mark phase.
    pub used_size: Cell<usize>,
    /// 1-based count of collections run so far, used to decide returning sweeps.
    pub sweep_count: Cell<usize>,
}

unsafe impl Sync for Heap {}

struct HeapCell {
    inner: UnsafeCell<Option<Heap>>,
}

unsafe impl Sync for HeapCell {}

lazy_static! {
    static ref HEAP: HeapCell = HeapCell { inner: UnsafeCell::new(None) };
}

static INITED: AtomicBool = AtomicBool::new(false);

/// Returns the global heap.
///
/// # Panics
/// Panics if called before [`init`] has completed successfully. Every public entry point in this
/// crate other than `init` itself goes through this, so calling them first is a programming error,
/// not a recoverable runtime condition.
pub fn heap() -> &'static Heap {
    // Safety: `HEAP.inner` is written at most once, by `init`, before `INITED` is ever observed
    // true; every caller here only reaches this line after `INITED` is true (directly, or via
    // `init`'s own early-return for a second call), so this shared reference can never alias a
    // concurrent write. There being only ever one writer and it happening-before every reader is
    // exactly the invariant `unsafe impl Sync for HeapCell` asserts.
    let opt = unsafe { &*HEAP.inner.get() };
    opt.as_ref().expect("cgc::init must be called before any other cgc function")
}

pub fn is_initialized() -> bool {
    INITED.load(Ordering::Relaxed)
}

/// Reserves the heap's address space, discovers the stack bottom, and installs the global heap.
/// Idempotent: a second call after a successful first one is a no-op.
pub fn init(config: Config) -> Result<(), InitError> {
    if INITED.load(Ordering::Relaxed) {
        return Ok(());
    }
    if std::mem::size_of::<usize>() != 8 {
        return Err(InitError::NotSixtyFourBit);
    }

    crate::logger::try_init();
    info!("cgc: initializing");

    let stack_bottom = vm::discover_stack_bottom()?;

    let reservation_len = constants::NUM_REGIONS * constants::REGION_SIZE;
    vm::reserve(address::BASE, reservation_len).map_err(InitError::Reservation)?;

    let mark_stack = match MarkStack::new() {
        Ok(stack) => stack,
        Err(e) => {
            let _ = vm::release(address::BASE, reservation_len);
            return Err(InitError::Reservation(e));
        }
    };

    let heap = Heap {
        regions: RegionTable::new(),
        roots: Roots::new(),
        mark_stack,
        enabled: Cell::new(config.collect_on_init),
        stack_bottom: Cell::new(stack_bottom),
        alloc_since_gc: Cell::new(0),
        trigger_size: Cell::new(config.min_trigger),
        used_size: Cell::new(0),
        sweep_count: Cell::new(0),
        config,
    };

    // Safety: nothing else can observe `HEAP` yet, since `INITED` is still false and every other
    // accessor checks it (or is `init` itself, guarded above against re-entry by the early return).
    unsafe {
        *HEAP.inner.get() = Some(heap);
    }
    INITED.store(true, Ordering::Relaxed);
    info!("cgc: initialized, stack_bottom={stack_bottom}");
    Ok(())
}

/// Runs a full collection unconditionally, regardless of the trigger. Callers are responsible for
/// checking `enabled` first: `crate::collect` does so before calling this, and `maybe_collect`
/// only reaches this after already checking it.
pub fn collect(heap: &Heap) {
    debug!("cgc: collect begin (sweep #{})", heap.sweep_count.get() + 1);

    mark::mark_init(&heap.regions);

    let stack_range = (vm::stack_top(), heap.stack_bottom.get());
    // Safety: `stack_range` spans this thread's live stack down to the bottom `init` discovered;
    // every registered root's storage is the registering caller's responsibility to keep valid
    // for as long as it remains registered (see `crate::roots::Roots::scan_ranges`).
    let root_ranges = unsafe { heap.roots.scan_ranges() };
    let live_bytes = unsafe { mark::mark(&heap.regions, &heap.mark_stack, stack_range, root_ranges) };
    heap.used_size.set(live_bytes);

    let sweep_count = heap.sweep_count.get() + 1;
    heap.sweep_count.set(sweep_count);
    crate::sweep::sweep(&heap.regions, sweep_count, heap.config.return_sweep);

    debug!("cgc: collect end, live_bytes={live_bytes}");
}

/// Accounts `size` newly-allocated bytes, and runs a collection (plus recomputes the next trigger)
/// if the running total has crossed `trigger_size` and collection is enabled.
pub fn maybe_collect(heap: &Heap, size: usize) {
    let alloc = heap.alloc_since_gc.get() + size;
    heap.alloc_since_gc.set(alloc);
    if alloc < heap.trigger_size.get() || !heap.enabled.get() {
        return;
    }

    collect(heap);

    let stack_bytes = heap.stack_bottom.get() - vm::stack_top();
    // Safety: see `collect`'s identical access above.
    let root_bytes: usize =
        unsafe { heap.roots.scan_ranges() }.iter().map(|(start, end)| *end - *start).sum();
    let scan_size = 2 * stack_bytes + root_bytes + 2 * heap.used_size.get();
    let trigger = ((scan_size as f64) / heap.config.space_factor) as usize;
    heap.trigger_size.set(trigger.max(heap.config.min_trigger));
    // Reset to this call's own size, not zero: the allocation that tripped the trigger has
    // already happened by the time the caller resumes, so it counts against the freshly
    // recomputed trigger rather than being forgotten.
    heap.alloc_since_gc.set(size);
}

#[cfg(test)]
mod tests {
    use super::*;

    // `Heap` construction reserves real address space at a fixed base, so only one test process
    // may hold an initialized heap at a time; see `tests/` for the serialized integration suite
    // that actually exercises `init`/`collect` end to end. This module only covers logic that
    // does not require the global singleton.

    #[test]
    fn trigger_floor_is_respected_by_construction() {
        let config = Config::default();
        assert!(config.min_trigger > 0);
    }
}
