//! Error types and the three-tier error dispatch described for this collector: fatal aborts,
//! non-fatal callback-then-null, and the silent handling of invalid frees.
//!
//! No error-derive crate is used here; hand-written `Display`/`Error` impls match how this
//! crate's own model handles the handful of error paths it has.

use std::cell::UnsafeCell;
use std::fmt;

use log::error;

/// Failure during [`crate::init`].
#[derive(Debug)]
pub enum InitError {
    /// The process is not running on a 64-bit target.
    NotSixtyFourBit,
    /// The fixed-address virtual memory reservation could not be made.
    Reservation(std::io::Error),
    /// Stack-bottom discovery failed for a reason other than the expected end-of-residency signal.
    StackBottom(std::io::Error),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::NotSixtyFourBit => {
                write!(f, "this collector requires a 64-bit target")
            }
            InitError::Reservation(e) => {
                write!(f, "failed to reserve the heap's virtual address range: {e}")
            }
            InitError::StackBottom(e) => {
                write!(f, "failed to discover the stack bottom: {e}")
            }
        }
    }
}

impl std::error::Error for InitError {}

/// Failure to register a root.
#[derive(Debug)]
pub enum RootError {
    /// The root's byte size exceeds [`crate::constants::MAX_ROOT_SIZE`].
    TooLarge { size: usize, max: usize },
}

impl fmt::Display for RootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootError::TooLarge { size, max } => {
                write!(f, "root size {size} exceeds the maximum of {max} bytes")
            }
        }
    }
}

impl std::error::Error for RootError {}

/// A user-supplied callback invoked on allocator errors, mirroring the single global callback
/// slot this collector's design exposes. `fatal` tells the callback whether the process is
/// about to abort; `errno` carries the platform error code, when one applies, or 0.
pub type ErrorFunc = fn(fatal: bool, errno: i32);

/// The process-global error callback slot, mirroring `crate::heap::Heap`'s own
/// `UnsafeCell`-plus-`unsafe impl Sync` pattern: there is exactly one callback for the whole
/// process, and the safety argument is the same one documented there — this collector is never
/// driven from more than one thread, so there is nothing to actually synchronize.
struct ErrorFuncCell {
    inner: UnsafeCell<Option<ErrorFunc>>,
}

unsafe impl Sync for ErrorFuncCell {}

static ERROR_FUNC: ErrorFuncCell = ErrorFuncCell { inner: UnsafeCell::new(None) };

/// Installs (or, with `None`, clears) the global error callback.
pub fn set_error_callback(f: Option<ErrorFunc>) {
    // Safety: see `ErrorFuncCell`'s doc comment; this collector's single-mutator-thread contract
    // means this write can never race a concurrent read or write of the same cell.
    unsafe {
        *ERROR_FUNC.inner.get() = f;
    }
}

/// Dispatches an error through the installed callback, then aborts if `fatal` is set.
///
/// Mirrors the three-tier model: fatal errors abort the process after the callback runs
/// (whether or not the callback itself panics or returns); non-fatal errors invoke the callback
/// and let the caller fall back to returning null.
pub fn handle_error(fatal: bool, errno: i32) {
    if errno != 0 {
        error!("cgc: error (errno={errno}, fatal={fatal})");
    } else {
        error!("cgc: error (fatal={fatal})");
    }
    // Safety: see `ErrorFuncCell`'s doc comment.
    let f = unsafe { *ERROR_FUNC.inner.get() };
    if let Some(f) = f {
        f(fatal, errno);
    }
    if fatal {
        std::process::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_error_display_mentions_both_sizes() {
        let e = RootError::TooLarge {
            size: 5_000_000_000,
            max: 1_073_741_824,
        };
        let s = e.to_string();
        assert!(s.contains("5000000000"));
        assert!(s.contains("1073741824"));
    }

    #[test]
    fn callback_install_and_clear() {
        fn cb(_fatal: bool, _errno: i32) {}
        set_error_callback(Some(cb));
        set_error_callback(None);
    }
}
