//! Step iteration.
//!
//! Four orders exist: the two id orders walk the dense id range directly,
//! the two topological orders follow the chain edges materialized by the
//! sorter. Iterators are forward-only and yield exactly the step count the
//! metadata records for their scope; a graph that ends early is logged as a
//! defect and the iterator stops.

use std::sync::Arc;

use tracing::error;

use tracegraph_core::types::keys;
use tracegraph_core::StepId;
use tracegraph_storage::{Dir, EdgeType, GraphStorage};

use crate::step::Step;
use crate::trace::TraceInner;

/// Iteration order over the steps of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Ascending step id (insertion order).
    IncreasingId,
    /// Descending step id.
    DecreasingId,
    /// Topological order, source to sink.
    IncreasingTo,
    /// Reverse topological order, sink to source.
    DecreasingTo,
}

impl Order {
    /// Whether this order requires a materialized sort.
    pub fn is_topological(&self) -> bool {
        matches!(self, Order::IncreasingTo | Order::DecreasingTo)
    }
}

/// Actor/action restriction applied during iteration.
#[derive(Debug, Clone)]
pub(crate) struct Filter {
    actor: String,
    action: Option<String>,
}

impl Filter {
    pub(crate) fn actor(actor: &str) -> Self {
        Self {
            actor: actor.to_string(),
            action: None,
        }
    }

    pub(crate) fn action(actor: &str, action: &str) -> Self {
        Self {
            actor: actor.to_string(),
            action: Some(action.to_string()),
        }
    }

    fn matches(&self, storage: &dyn GraphStorage, id: StepId) -> bool {
        let actor_ok = matches!(
            storage.node_prop(id, keys::STEP_ACTOR),
            Ok(Some(v)) if v.as_text() == Some(self.actor.as_str())
        );
        if !actor_ok {
            return false;
        }
        match &self.action {
            None => true,
            Some(action) => matches!(
                storage.node_prop(id, keys::STEP_ACTION),
                Ok(Some(v)) if v.as_text() == Some(action.as_str())
            ),
        }
    }
}

enum Cursor {
    Ascending { next: StepId, limit: StepId },
    Descending { next: Option<StepId> },
    Chain { current: Option<StepId>, forward: bool, started: bool },
}

/// Forward-only iterator over step views.
pub struct StepIter {
    trace: Arc<TraceInner>,
    cursor: Cursor,
    filter: Option<Filter>,
    /// Steps still to yield; the metadata count is authoritative.
    remaining: u64,
}

impl StepIter {
    pub(crate) fn new(trace: Arc<TraceInner>, order: Order, filter: Option<Filter>) -> Self {
        let (remaining, step_count) = {
            let meta = trace.meta.lock();
            let remaining = match &filter {
                None => meta.step_count(),
                Some(f) => match &f.action {
                    None => meta.steps_of_actor(&f.actor),
                    Some(action) => meta.steps_of_action(&f.actor, action),
                },
            };
            (remaining, meta.step_count())
        };
        let cursor = match order {
            Order::IncreasingId => Cursor::Ascending {
                next: 0,
                limit: step_count,
            },
            Order::DecreasingId => Cursor::Descending {
                next: step_count.checked_sub(1),
            },
            Order::IncreasingTo => Cursor::Chain {
                current: None,
                forward: true,
                started: false,
            },
            Order::DecreasingTo => Cursor::Chain {
                current: None,
                forward: false,
                started: false,
            },
        };
        Self {
            trace,
            cursor,
            filter,
            remaining,
        }
    }

    /// Next candidate id in cursor order, or `None` when the order is
    /// exhausted.
    fn advance(&mut self) -> Option<StepId> {
        match &mut self.cursor {
            Cursor::Ascending { next, limit } => {
                if *next >= *limit {
                    return None;
                }
                let id = *next;
                *next += 1;
                Some(id)
            }
            Cursor::Descending { next } => {
                let id = (*next)?;
                *next = id.checked_sub(1);
                Some(id)
            }
            Cursor::Chain {
                current,
                forward,
                started,
            } => {
                let next = if !*started {
                    *started = true;
                    let meta = self.trace.meta.lock();
                    if *forward {
                        meta.source_node()
                    } else {
                        meta.sink_node()
                    }
                } else {
                    let cur = (*current)?;
                    chain_neighbor(&self.trace, cur, *forward)
                };
                *current = next;
                next
            }
        }
    }
}

/// Follow the chain one hop from `id`.
fn chain_neighbor(trace: &Arc<TraceInner>, id: StepId, forward: bool) -> Option<StepId> {
    let dir = if forward { Dir::Outgoing } else { Dir::Incoming };
    let hop = trace.read(|s| -> tracegraph_core::Result<Option<StepId>> {
        let edge = match s.single_edge(id, dir, EdgeType::Chain)? {
            Some(e) => e,
            None => return Ok(None),
        };
        let (source, target) = s.edge_endpoints(edge)?;
        Ok(Some(if forward { target } else { source }))
    });
    match hop {
        Ok(next) => next,
        Err(e) => {
            error!(step = id, error = %e, "chain traversal failed");
            None
        }
    }
}

impl Iterator for StepIter {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        while self.remaining > 0 {
            let id = match self.advance() {
                Some(id) => id,
                None => {
                    error!(
                        missing = self.remaining,
                        "iteration order exhausted before the recorded step count"
                    );
                    return None;
                }
            };
            let keep = match &self.filter {
                None => true,
                Some(filter) => self.trace.read(|s| filter.matches(s, id)),
            };
            if keep {
                self.remaining -= 1;
                match self.trace.step_view(id) {
                    Some(step) => return Some(step),
                    // missing node is already logged; stop rather than spin
                    None => return None,
                }
            }
        }
        None
    }
}
