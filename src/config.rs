//! Runtime-tunable knobs, as opposed to the size-class geometry in [`crate::constants`], which
//! the region table's address arithmetic depends on and cannot be changed without re-deriving it.
//!
//! `Config` is read once by [`crate::init`] and never mutated after. There is no `-X`-style
//! command-line parser here: this crate has no process entry point of its own, so a plain
//! validated struct constructed by the embedder is the whole configuration surface.

use crate::constants;

/// Operational tuning for the collector. Construct with [`Config::default`] and override only
/// the fields that matter for the embedding; the defaults reproduce the collector this crate's
/// algorithm is drawn from.
#[derive(Clone, Debug)]
pub struct Config {
    /// Growth factor applied when computing the next allocation trigger from live data size.
    pub space_factor: f64,
    /// Floor under the allocation trigger.
    pub min_trigger: usize,
    /// Maximum slots harvested from a region's mark window per allocation call.
    pub freelist_len: usize,
    /// Minimum commit granularity, in pages, when a region needs more backing memory.
    pub protect_len: usize,
    /// A returning (page-releasing) sweep happens once every this-many collections.
    pub return_sweep: usize,
    /// Whether collection is enabled immediately after [`crate::init`] returns.
    pub collect_on_init: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            space_factor: constants::SPACE_FACTOR,
            min_trigger: constants::MIN_TRIGGER,
            freelist_len: constants::FREELIST_LEN,
            protect_len: constants::PROTECT_LEN,
            return_sweep: constants::RETURN_SWEEP,
            collect_on_init: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_constants() {
        let c = Config::default();
        assert_eq!(c.space_factor, constants::SPACE_FACTOR);
        assert_eq!(c.min_trigger, constants::MIN_TRIGGER);
        assert_eq!(c.freelist_len, constants::FREELIST_LEN);
        assert_eq!(c.protect_len, constants::PROTECT_LEN);
        assert_eq!(c.return_sweep, constants::RETURN_SWEEP);
        assert!(c.collect_on_init);
    }
}
