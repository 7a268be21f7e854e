//! The graph storage capability.
//!
//! [`GraphStorage`] is the only surface the engine sees: node and edge
//! creation with property sets, property CRUD, kind-filtered degree counts
//! and traversal, and the single-edge lookup used for the chain. Backends
//! implement it once per target engine; the trace core never references
//! backend-specific types.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use tracegraph_core::types::DependencyKind;
use tracegraph_core::value::PropValue;
use tracegraph_core::{EdgeId, Result, StepId};

/// Storage-side relationship type.
///
/// One type per dependency kind, plus [`EdgeType::Chain`]: the structural
/// edge materialized by the sorter to support ordered traversal. Chain edges
/// are never part of a step's dependency sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    /// FSM dependency edge
    Fsm,
    /// Guard dependency edge
    Guard,
    /// Port dependency edge
    Port,
    /// Tokens dependency edge
    Tokens,
    /// Variable dependency edge
    Variable,
    /// Merged dependency edge
    Merged,
    /// Scheduler dependency edge
    Scheduler,
    /// Dependency edge of undetermined kind
    Unknown,
    /// Topological-order chain edge (structural, not a dependency)
    Chain,
}

/// Fixed bidirectional kind <-> edge-type table, built once.
static KIND_TYPE_TABLE: Lazy<[(DependencyKind, EdgeType); 8]> = Lazy::new(|| {
    [
        (DependencyKind::Fsm, EdgeType::Fsm),
        (DependencyKind::Guard, EdgeType::Guard),
        (DependencyKind::Port, EdgeType::Port),
        (DependencyKind::Tokens, EdgeType::Tokens),
        (DependencyKind::Variable, EdgeType::Variable),
        (DependencyKind::Merged, EdgeType::Merged),
        (DependencyKind::Scheduler, EdgeType::Scheduler),
        (DependencyKind::Unknown, EdgeType::Unknown),
    ]
});

impl EdgeType {
    /// Storage type for a dependency kind.
    pub fn from_kind(kind: DependencyKind) -> EdgeType {
        KIND_TYPE_TABLE
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, t)| *t)
            .expect("every kind has a storage type")
    }

    /// Dependency kind for a storage type; `None` for [`EdgeType::Chain`].
    pub fn kind(&self) -> Option<DependencyKind> {
        KIND_TYPE_TABLE
            .iter()
            .find(|(_, t)| t == self)
            .map(|(k, _)| *k)
    }

    /// The edge types that participate in ordering, mirroring
    /// [`DependencyKind::ORDERING`].
    pub const ORDERING: [EdgeType; 7] = [
        EdgeType::Fsm,
        EdgeType::Guard,
        EdgeType::Port,
        EdgeType::Tokens,
        EdgeType::Variable,
        EdgeType::Scheduler,
        EdgeType::Merged,
    ];
}

/// Traversal direction relative to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dir {
    /// Edges arriving at the node
    Incoming,
    /// Edges leaving the node
    Outgoing,
}

/// Node/edge storage with typed, directed edges and per-record properties.
///
/// Mutations become durable at the next [`commit`](GraphStorage::commit);
/// the engine's coalescer decides when that happens. Implementations are
/// single-writer: no internal locking is promised or required.
pub trait GraphStorage: Send {
    /// Create a node with the given property set. Fails if `id` exists.
    fn create_node(&mut self, id: StepId, props: Vec<(String, PropValue)>) -> Result<()>;

    /// Check whether a node exists.
    fn node_exists(&self, id: StepId) -> bool;

    /// Number of nodes in the store.
    fn node_count(&self) -> u64;

    /// Create a typed, directed edge with the given property set.
    /// Both endpoints must already exist.
    fn create_edge(
        &mut self,
        source: StepId,
        target: StepId,
        edge_type: EdgeType,
        props: Vec<(String, PropValue)>,
    ) -> Result<EdgeId>;

    /// Delete an edge. Fails if the reference is unknown.
    fn delete_edge(&mut self, edge: EdgeId) -> Result<()>;

    /// Get a node property by exact key.
    fn node_prop(&self, id: StepId, key: &str) -> Result<Option<PropValue>>;

    /// Set a node property.
    fn set_node_prop(&mut self, id: StepId, key: &str, value: PropValue) -> Result<()>;

    /// Remove a node property, returning the previous value if any.
    fn remove_node_prop(&mut self, id: StepId, key: &str) -> Result<Option<PropValue>>;

    /// Enumerate the node's non-structural property keys (reserved-prefix
    /// keys are excluded).
    fn node_prop_keys(&self, id: StepId) -> Result<Vec<String>>;

    /// Get an edge property by exact key.
    fn edge_prop(&self, edge: EdgeId, key: &str) -> Result<Option<PropValue>>;

    /// Set an edge property.
    fn set_edge_prop(&mut self, edge: EdgeId, key: &str, value: PropValue) -> Result<()>;

    /// Remove an edge property, returning the previous value if any.
    fn remove_edge_prop(&mut self, edge: EdgeId, key: &str) -> Result<Option<PropValue>>;

    /// Enumerate the edge's non-structural property keys.
    fn edge_prop_keys(&self, edge: EdgeId) -> Result<Vec<String>>;

    /// Source and target node of an edge.
    fn edge_endpoints(&self, edge: EdgeId) -> Result<(StepId, StepId)>;

    /// Storage type of an edge.
    fn edge_type(&self, edge: EdgeId) -> Result<EdgeType>;

    /// Directed degree of a node restricted to the given edge types.
    fn degree(&self, id: StepId, dir: Dir, types: &[EdgeType]) -> Result<usize>;

    /// Edges of a node, filtered by direction and type set, in creation
    /// order.
    fn edges(&self, id: StepId, dir: Dir, types: &[EdgeType]) -> Result<Vec<EdgeId>>;

    /// The single edge of a distinguished type in a direction, or `None`.
    /// It is a storage error for more than one such edge to exist.
    fn single_edge(&self, id: StepId, dir: Dir, edge_type: EdgeType) -> Result<Option<EdgeId>>;

    /// Make all pending mutations durable.
    fn commit(&mut self) -> Result<()>;

    /// Commit and release the backing resources. Idempotent.
    fn shutdown(&mut self) -> Result<()>;
}
