//! Trace engine tuning knobs.

/// Configuration shared by the builder and the reader.
///
/// The defaults are sized for traces in the tens of millions of steps on a
/// workstation; smaller values only matter for tests and memory-constrained
/// runs.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Capacity of the step view cache (entries, not bytes).
    pub step_cache_capacity: usize,
    /// Capacity of the dependency view cache.
    pub dependency_cache_capacity: usize,
    /// Uncommitted-mutation bound: the coalescer commits once more than this
    /// many mutations are pending.
    pub max_uncommitted: u64,
    /// Once total mutations cross this count, batch commits are logged at
    /// info level so long builds show progress.
    pub log_every: u64,
    /// When loading through a [`TraceSource`], discard any existing database
    /// and rebuild unconditionally.
    ///
    /// [`TraceSource`]: https://docs.rs/tracegraphdb
    pub discard_trace_data: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            step_cache_capacity: 100_000,
            dependency_cache_capacity: 100_000,
            max_uncommitted: 500_000,
            log_every: 5_000_000,
            discard_trace_data: false,
        }
    }
}
