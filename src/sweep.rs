//! The sweep engine: turns a completed mark bitmap back into usable space.
//!
//! Each non-empty region is walked once, from its highest allocated slot downward, over the
//! trailing run of dead (unmarked) slots. The bump pointer is pulled back over that whole dead
//! tail in every sweep; additionally, every `RETURN_SWEEP`-th sweep (and every sweep of a
//! big/huge region) keeps walking past that point, page-decommitting any further dead run at
//! least `MIN_DECOMMIT_RUN` bytes long. Nothing is ever eagerly linked onto a freelist here: that
//! happens lazily, during subsequent allocations, by harvesting the `[markstartptr, markendptr)`
//! window this sweep leaves behind (see `crate::alloc`).

use log::{debug, trace, warn};

use crate::address::Address;
use crate::constants::{BIG_IDX_OFFSET, MIN_DECOMMIT_RUN, PAGE};
use crate::region::RegionTable;
use crate::vm;

/// Sweeps every non-empty region. `sweep_count` is this collector's 1-based count of collections
/// performed so far (used to decide whether this is a "returning", page-releasing sweep);
/// `return_sweep` is the configured period.
pub fn sweep(regions: &RegionTable, sweep_count: usize, return_sweep: usize) {
    let mut returning = return_sweep != 0 && sweep_count % return_sweep == 0;
    let mut reclaimed = 0usize;

    for (i, region) in regions.iter().enumerate() {
        if region.is_empty() {
            continue;
        }
        if i >= BIG_IDX_OFFSET {
            // Once the sweep reaches the first big region, every following region (including all
            // huge regions) is swept as a returning sweep too: their objects are large enough
            // that deferring page release to the next multiple-of-8 collection wastes real
            // memory, unlike a small region's much smaller per-object footprint.
            returning = true;
        }
        reclaimed += sweep_region(region, returning);
    }

    trace!("cgc: sweep complete, {reclaimed} bytes decommitted");
}

fn sweep_region(region: &crate::region::Region, returning: bool) -> usize {
    let size = region.size;
    let lastidx = (region.live_slot_count() - 1) as isize;
    let target = lastidx / 2;
    let mut ptridx = lastidx;
    let mut freesize: usize = 0;
    let mut start = true;
    let mut reclaimed = 0usize;

    loop {
        let cutoff = ptridx < target;
        // Safety: `ptridx >= target >= 0` whenever `cutoff` is false, so the cast below is in
        // bounds; `is_marked` is only ever called in that branch.
        let marked = !cutoff && unsafe { region.is_marked(ptridx as usize) };

        if cutoff || marked {
            if freesize >= MIN_DECOMMIT_RUN {
                let mut offset = size * (ptridx as usize + 1);
                let rem = offset % PAGE;
                let align_diff = if rem == 0 { 0 } else { PAGE - rem };
                offset += align_diff;
                let mut run_len = freesize.saturating_sub(align_diff);
                run_len -= run_len % PAGE;
                if run_len > 0 {
                    let addr = region.startptr + offset;
                    match vm::decommit(addr, run_len) {
                        Ok(()) => reclaimed += run_len,
                        Err(e) => warn!("cgc: decommit of {run_len} bytes at {addr} failed: {e}"),
                    }
                }
            }
            freesize = 0;

            if start {
                region.freeptr.set(region.startptr + size * (ptridx as usize + 1));
                start = false;
                if !returning {
                    break;
                }
            }
            if cutoff {
                break;
            }
        } else {
            freesize += size;
        }
        ptridx -= 1;
    }

    region.markstartptr.set(region.startptr);
    region.markendptr.set(region.freeptr.get());
    region.freelist.set(Address::ZERO);
    debug!(
        "cgc: region size={size} freeptr-startptr={} reclaimed={reclaimed}",
        region.freeptr.get() - region.startptr
    );
    reclaimed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionTable;

    #[test]
    fn sweeping_an_empty_region_table_touches_nothing() {
        // Every region starts with freeptr == startptr, so sweep() must skip all of them without
        // ever dereferencing a null mark bitmap.
        let regions = RegionTable::new();
        sweep(&regions, 1, 8);
    }
}
