use std::num::NonZeroUsize;
use std::thread;

/// Knobs for frame computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Check that frames flowing into a block with a declared frame are assignable to it
    ///
    /// When this is off, declared frames are trusted as-is.
    pub check_declared_frames: bool,

    /// Maximum number of block visits in the fixpoint for a single method
    ///
    /// Joins only ever widen frames, so the fixpoint always terminates eventually. This bounds
    /// how much work a pathological method can cause.
    pub max_fixpoint_iterations: usize,

    /// Number of threads used when processing many methods at once
    pub worker_threads: usize,
}

impl Settings {
    pub const DEFAULT_MAX_FIXPOINT_ITERATIONS: usize = 10_000;
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            check_declared_frames: true,
            max_fixpoint_iterations: Settings::DEFAULT_MAX_FIXPOINT_ITERATIONS,
            worker_threads: thread::available_parallelism().map_or(1, NonZeroUsize::get),
        }
    }
}
