//! Topological-order materialization.
//!
//! Kahn's algorithm over the ordering dependency edges, with two twists that
//! keep it disk-friendly on traces far larger than memory:
//!
//! - Edges are never deleted. Processing an edge tags it with the
//!   [`keys::SORT_REMOVED`] property; a step joins the frontier once every
//!   incoming ordering edge carries the tag. The dependency graph survives
//!   the sort intact.
//! - The resulting order is materialized as a single path of `Chain` edges
//!   from the first placed step (the source) to the last (the sink), so
//!   topological iteration is a pointer chase instead of a recomputation.
//!
//! The frontier is a LIFO stack seeded with the zero-in-degree steps in
//! ascending id order, which makes the produced order deterministic.

use tracing::{debug, info};

use tracegraph_core::types::keys;
use tracegraph_core::value::PropValue;
use tracegraph_core::{Error, Result, StepId};
use tracegraph_storage::{Dir, EdgeType};

use crate::trace::TraceInner;

const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Sort the trace and materialize the chain. Updates the in-memory metadata
/// (sorted flag, chain endpoints) on success; persisting it is the caller's
/// job.
pub(crate) fn run(inner: &TraceInner) -> Result<()> {
    let total = inner.meta.lock().step_count();
    info!(steps = total, "sorting trace");

    let (source, sink) = inner.bulk_mutate(|storage, coalescer| {
        // Reset pass: drop any chain edges and stale removal tags left by an
        // earlier sort that did not complete, and seed the frontier with the
        // steps that have no incoming ordering dependency.
        let mut frontier: Vec<StepId> = Vec::new();
        for id in 0..total {
            if let Some(chain) = storage.single_edge(id, Dir::Outgoing, EdgeType::Chain)? {
                storage.delete_edge(chain)?;
                coalescer.record(storage)?;
            }
            for edge in storage.edges(id, Dir::Outgoing, &EdgeType::ORDERING)? {
                if storage.remove_edge_prop(edge, keys::SORT_REMOVED)?.is_some() {
                    coalescer.record(storage)?;
                }
            }
            if storage.degree(id, Dir::Incoming, &EdgeType::ORDERING)? == 0 {
                frontier.push(id);
            }
        }
        debug!(roots = frontier.len(), "frontier seeded");

        let mut placed = 0u64;
        let mut source: Option<StepId> = None;
        let mut previous: Option<StepId> = None;

        while let Some(id) = frontier.pop() {
            match previous {
                None => source = Some(id),
                Some(prev) => {
                    storage.create_edge(prev, id, EdgeType::Chain, Vec::new())?;
                    coalescer.record(storage)?;
                }
            }
            previous = Some(id);
            placed += 1;
            if placed % PROGRESS_INTERVAL == 0 {
                info!(placed, total, "sort progress");
            }

            // Tag the outgoing ordering edges as processed, then promote
            // each distinct successor whose incoming edges are all tagged.
            let mut successors: Vec<StepId> = Vec::new();
            for edge in storage.edges(id, Dir::Outgoing, &EdgeType::ORDERING)? {
                storage.set_edge_prop(edge, keys::SORT_REMOVED, PropValue::Bool(true))?;
                coalescer.record(storage)?;
                let (_, target) = storage.edge_endpoints(edge)?;
                if !successors.contains(&target) {
                    successors.push(target);
                }
            }
            for succ in successors {
                let mut ready = true;
                for edge in storage.edges(succ, Dir::Incoming, &EdgeType::ORDERING)? {
                    if storage.edge_prop(edge, keys::SORT_REMOVED)?.is_none() {
                        ready = false;
                        break;
                    }
                }
                if ready {
                    frontier.push(succ);
                }
            }
        }

        if placed < total {
            return Err(Error::SchedulingCycle { placed, total });
        }
        coalescer.flush(storage)?;

        // placed == total >= 1, so both ends exist
        match (source, previous) {
            (Some(source), Some(sink)) => Ok((source, sink)),
            _ => Err(Error::InvalidState("sort placed no steps".into())),
        }
    })?;

    inner.meta.lock().mark_sorted(source, sink);
    info!(source, sink, "trace sorted");
    Ok(())
}
