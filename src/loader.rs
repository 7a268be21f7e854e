//! Loading traces with rebuild fallback.
//!
//! The database built for a trace file is a cache of that file. The loader
//! therefore never fails on a bad database: if reopening does not work for
//! any reason (missing directory, torn metadata, count mismatch), the stale
//! state is wiped and the database is rebuilt from the trace file through
//! the caller's [`TraceSource`].

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::{db_dir_for, Result, Trace, TraceBuilder, TraceConfig};

/// Producer of trace content, called during a rebuild.
///
/// Implementations parse one concrete trace format (an XML event log, a
/// binary dump) and feed it into the builder: steps first, in dense id
/// order, then dependencies, then trace-level attributes.
pub trait TraceSource {
    /// Feed the entire trace into `builder`. The builder is already
    /// configured; the loader calls [`TraceBuilder::build`] afterwards.
    fn read_into(&mut self, builder: &mut TraceBuilder) -> Result<()>;
}

/// Opens existing trace databases, rebuilding them when necessary.
pub struct TraceLoader;

impl TraceLoader {
    /// Open the database of `trace_file`, rebuilding it from `source` if it
    /// is missing, unreadable or explicitly discarded by the configuration.
    pub fn load(
        trace_file: &Path,
        config: &TraceConfig,
        source: &mut dyn TraceSource,
    ) -> Result<Trace> {
        let db_dir = db_dir_for(trace_file);

        if db_dir.exists() && !config.discard_trace_data {
            match Trace::open(trace_file, config) {
                Ok(trace) => {
                    debug!(trace = %trace_file.display(), "existing trace database reused");
                    return Ok(trace);
                }
                Err(e) => {
                    info!(trace = %trace_file.display(), error = %e,
                        "trace database unusable, rebuilding");
                }
            }
        }

        if db_dir.exists() {
            info!(db_dir = %db_dir.display(), "removing stale trace database");
            if let Err(e) = fs::remove_dir_all(&db_dir) {
                // create() truncates what matters; leftover files are noise
                warn!(db_dir = %db_dir.display(), error = %e,
                    "stale database could not be fully removed");
            }
        }

        info!(trace = %trace_file.display(), "building trace database");
        let mut builder = TraceBuilder::new(trace_file);
        builder.configure(config)?;
        source.read_into(&mut builder)?;
        builder.build()
    }
}
