//! Transaction coalescing.
//!
//! Every mutating storage call is recorded here. Once more than `threshold`
//! mutations are pending, the current batch is committed (flushed and
//! synced) and the counter resets. This bounds how much work an unclean
//! stop can lose while keeping per-mutation overhead flat: it is a
//! throughput/durability knob, not an atomicity mechanism.

use tracing::{debug, info};

use crate::graph::GraphStorage;
use tracegraph_core::Result;

/// Batches mutating storage operations into bounded-size commits.
pub struct TransactionCoalescer {
    threshold: u64,
    log_every: u64,
    pending: u64,
    total: u64,
    commits: u64,
}

impl TransactionCoalescer {
    /// Create a coalescer committing after more than `threshold` pending
    /// mutations. `log_every` is observational: once total mutations cross
    /// it, batch commits are logged at info instead of debug.
    pub fn new(threshold: u64, log_every: u64) -> Self {
        Self {
            threshold,
            log_every,
            pending: 0,
            total: 0,
            commits: 0,
        }
    }

    /// Record one mutating call, committing the batch if the threshold is
    /// exceeded.
    pub fn record(&mut self, storage: &mut dyn GraphStorage) -> Result<()> {
        self.pending += 1;
        self.total += 1;
        if self.pending > self.threshold {
            storage.commit()?;
            self.commits += 1;
            if self.total > self.log_every {
                info!(
                    total = self.total,
                    commits = self.commits,
                    "committing mutation batch"
                );
            } else {
                debug!(
                    total = self.total,
                    commits = self.commits,
                    "committing mutation batch"
                );
            }
            self.pending = 0;
        }
        Ok(())
    }

    /// Commit whatever is pending, regardless of the threshold.
    pub fn flush(&mut self, storage: &mut dyn GraphStorage) -> Result<()> {
        storage.commit()?;
        if self.pending > 0 {
            self.commits += 1;
            self.pending = 0;
        }
        Ok(())
    }

    /// Mutations recorded since the last commit boundary.
    pub fn pending(&self) -> u64 {
        self.pending
    }

    /// Total mutations recorded over the coalescer's lifetime.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of batch commits issued so far.
    pub fn commits(&self) -> u64 {
        self.commits
    }
}
