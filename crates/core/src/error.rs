//! Unified error types for tracegraph.
//!
//! One taxonomy is shared by every workspace member and re-exported by the
//! facade crate. Per-record failures (a single attribute that cannot be
//! encoded, a single missing step) are logged and degraded at the call site;
//! the variants here cover the structural failures that must reach callers.

use thiserror::Error;

use crate::types::StepId;

/// All tracegraph errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Backing storage directory is missing or corrupt at open time.
    #[error("trace storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Reopening existing on-disk data failed; the trace must be rebuilt
    /// from its external source.
    #[error("trace database must be rebuilt: {0}")]
    RebuildRequired(String),

    /// A value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A requested step id has no backing node.
    #[error("step {0} is not registered in this trace")]
    Lookup(StepId),

    /// The ordering dependency set is not acyclic; the topological sort
    /// cannot place every step.
    #[error("dependency cycle detected: only {placed} of {total} steps could be ordered")]
    SchedulingCycle {
        /// Steps placed before the frontier emptied
        placed: u64,
        /// Total steps in the trace
        total: u64,
    },

    /// An operation was issued in the wrong lifecycle phase.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Storage-level invariant violation (duplicate chain edge, unknown
    /// edge reference, malformed log record).
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error from the filesystem layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tracegraph operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check whether the loader should fall back to a full rebuild.
    pub fn is_rebuild_required(&self) -> bool {
        matches!(self, Error::RebuildRequired(_))
    }

    /// Check whether this is a fatal structural failure (as opposed to a
    /// per-record one that bulk operations degrade around).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Serialization(_) | Error::Lookup(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
