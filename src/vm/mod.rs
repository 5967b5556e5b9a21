//! Platform-specific virtual memory and stack introspection.
//!
//! The collector needs exactly four memory operations (reserve, commit, decommit, release) and
//! one piece of introspection (the bottom of the current thread's stack, for the implicit stack
//! root). Everything else in this crate is written against these five functions so the
//! mark/sweep/allocator code never has to know which OS it's running under.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::{
            commit, decommit, discover_stack_bottom, release, reserve, reserve_committed_anywhere,
            stack_top, zero,
        };
    } else if #[cfg(windows)] {
        mod windows;
        pub use windows::{
            commit, decommit, discover_stack_bottom, release, reserve, reserve_committed_anywhere,
            stack_top, zero,
        };
    } else {
        compile_error!("cgc has no virtual memory backend for this platform");
    }
}

/// Result of a platform memory operation: `Ok(())` on success, or the underlying OS error.
pub type VmResult = Result<(), std::io::Error>;
