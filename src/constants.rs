//! Byte/bit unit constants and the collector's own size-class and tuning constants.

/// log2 of the number of bytes in a byte
pub const LOG_BYTES_IN_BYTE: u8 = 0;
/// The number of bytes in a byte
pub const BYTES_IN_BYTE: usize = 1;
/// log2 of the number of bits in a byte
pub const LOG_BITS_IN_BYTE: u8 = 3;
/// The number of bits in a byte
pub const BITS_IN_BYTE: usize = 1 << LOG_BITS_IN_BYTE;

/// log2 of the number of bytes in a gigabyte
pub const LOG_BYTES_IN_GBYTE: u8 = 30;
/// The number of bytes in a gigabyte
pub const BYTES_IN_GBYTE: usize = 1 << LOG_BYTES_IN_GBYTE;

/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

#[cfg(target_pointer_width = "32")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 2;
#[cfg(target_pointer_width = "64")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 3;
/// The number of bytes in an address
pub const BYTES_IN_ADDRESS: usize = 1 << LOG_BYTES_IN_ADDRESS;

/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = LOG_BYTES_IN_ADDRESS;
/// The number of bytes in a word
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;

/// log2 of the number of bytes in a page
pub const LOG_BYTES_IN_PAGE: u8 = 12;
/// The number of bytes in a page (also the VM page size assumed by the platform layer)
pub const BYTES_IN_PAGE: usize = 1 << LOG_BYTES_IN_PAGE;
/// Alias matching the collector's own terminology for `BYTES_IN_PAGE`.
pub const PAGE: usize = BYTES_IN_PAGE;

static_assertions::const_assert!(core::mem::size_of::<usize>() == 8);

/// Smallest allocation granularity. Every region's object size is a multiple of this.
pub const UNIT: usize = 16;
/// Required alignment of every pointer returned by the allocator.
pub const ALIGNMENT: usize = 16;
static_assertions::const_assert!(ALIGNMENT <= UNIT);

/// Total number of size-segregated regions.
pub const NUM_REGIONS: usize = 768;

/// Per-region virtual address range. 4 GiB on non-Windows, 1 GiB on Windows, matching the
/// difference in how each platform accounts reserved-but-uncommitted address space.
#[cfg(not(windows))]
pub const REGION_SIZE: usize = 4 * BYTES_IN_GBYTE;
#[cfg(windows)]
pub const REGION_SIZE: usize = BYTES_IN_GBYTE;

/// Small regions occupy indices `[0, NUM_REGIONS/3)`, with object size stepping by `UNIT`.
pub const BIG_IDX_OFFSET: usize = NUM_REGIONS / 3;
/// Big regions occupy indices `[NUM_REGIONS/3, 2*NUM_REGIONS/3)`, stepping by `BIG_UNIT`.
pub const HUGE_IDX_OFFSET: usize = 2 * (NUM_REGIONS / 3);

/// Object size step for the "big" size class.
pub const BIG_UNIT: usize = BIG_IDX_OFFSET * UNIT;
/// Object size step for the "huge" size class.
pub const HUGE_UNIT: usize = BIG_IDX_OFFSET * BIG_UNIT;

/// Largest request size the allocator will service.
pub const MAX_ALLOC_SIZE: usize = (NUM_REGIONS - HUGE_IDX_OFFSET) * HUGE_UNIT;

/// Growth factor applied to the live-data estimate when computing the next collection trigger.
pub const SPACE_FACTOR: f64 = 1.75;
/// Floor under the allocation trigger so tiny heaps don't collect on every allocation.
pub const MIN_TRIGGER: usize = 100_000;
/// Maximum slots harvested from a region's mark window per allocator call.
pub const FREELIST_LEN: usize = 256;
/// Minimum commit granularity when a region's bump pointer needs more backing memory, in pages.
pub const PROTECT_LEN: usize = 16;
/// Size of the dedicated virtual reservation backing the explicit mark stack.
pub const MARK_STACK_SIZE: usize = BYTES_IN_GBYTE;
/// A "returning" (page-releasing) sweep happens once every this-many collections.
pub const RETURN_SWEEP: usize = 8;
/// Upper bound on the byte size of a single registered root.
pub const MAX_ROOT_SIZE: usize = BYTES_IN_GBYTE;
/// Mark-stack frames pushed while scanning a single frame before the swap-trick engages.
pub const MAX_MARK_PUSH: usize = 1024;
/// A dead run must span at least this many bytes before it's worth decommitting.
pub const MIN_DECOMMIT_RUN: usize = 3 * PAGE;
