//! Identifiers, dependency kinds and property-key constants.
//!
//! Step ids are dense integers assigned by the builder in insertion order;
//! edge ids are opaque references assigned by the storage layer. Property
//! keys under the reserved [`keys::RESERVED_PREFIX`] namespace are
//! structural: the public attribute API can never create, overwrite or
//! delete them.

use serde::{Deserialize, Serialize};

/// Dense step identifier in `[0, step_count)`.
pub type StepId = u64;

/// Opaque reference to a stored edge.
///
/// Assigned by [`GraphStorage`] on edge creation and stable for the lifetime
/// of the trace. Together with its kind it identifies a dependency.
///
/// [`GraphStorage`]: https://docs.rs/tracegraph-storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Category of a dependency between two steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Finite-state-machine control flow within an actor
    Fsm,
    /// Guard expression evaluation
    Guard,
    /// Port access ordering
    Port,
    /// Token production/consumption between ports
    Tokens,
    /// Shared variable access ordering
    Variable,
    /// Externally computed execution order, added post-hoc
    Scheduler,
    /// Several dependencies collapsed into one edge
    Merged,
    /// Kind could not be determined
    Unknown,
}

impl DependencyKind {
    /// The kinds that participate in ordering: degree counts, per-step
    /// dependency sets and the topological-sort frontier are all restricted
    /// to these. `Unknown` is representable but never ordering-relevant.
    pub const ORDERING: [DependencyKind; 7] = [
        DependencyKind::Fsm,
        DependencyKind::Guard,
        DependencyKind::Port,
        DependencyKind::Tokens,
        DependencyKind::Variable,
        DependencyKind::Scheduler,
        DependencyKind::Merged,
    ];

    /// Stable lowercase name, used in logs and the metadata file.
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Fsm => "fsm",
            DependencyKind::Guard => "guard",
            DependencyKind::Port => "port",
            DependencyKind::Tokens => "tokens",
            DependencyKind::Variable => "variable",
            DependencyKind::Scheduler => "scheduler",
            DependencyKind::Merged => "merged",
            DependencyKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a guard, port or variable dependency payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// The source step reads what the target wrote
    Read,
    /// The source step writes what the target reads
    Write,
}

impl Direction {
    /// Stable literal, stored as the `_tg_direction` property.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Read => "read",
            Direction::Write => "write",
        }
    }

    /// Parse the stored literal back.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Direction::Read),
            "write" => Some(Direction::Write),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural property keys.
///
/// Everything under [`RESERVED_PREFIX`](keys::RESERVED_PREFIX) is written by
/// the builder or the sorter, excluded from attribute enumeration, and
/// rejected by the public set/remove paths.
pub mod keys {
    /// Namespace prefix marking structural properties.
    pub const RESERVED_PREFIX: &str = "_tg_";

    /// Step property: actor name.
    pub const STEP_ACTOR: &str = "_tg_actor";
    /// Step property: action name.
    pub const STEP_ACTION: &str = "_tg_action";
    /// Step property: actor class name.
    pub const STEP_ACTOR_CLASS: &str = "_tg_actor-class";
    /// Step property: dense step id.
    pub const STEP_ID: &str = "_tg_id";
    /// Step property: encoded port -> read token count map.
    pub const STEP_READ_TOKENS: &str = "_tg_rtokens";
    /// Step property: encoded port -> write token count map.
    pub const STEP_WRITE_TOKENS: &str = "_tg_wtokens";
    /// Step property: encoded list of read variable names.
    pub const STEP_READ_VARIABLES: &str = "_tg_rvariables";
    /// Step property: encoded list of write variable names.
    pub const STEP_WRITE_VARIABLES: &str = "_tg_wvariables";

    /// Dependency property: source step id.
    pub const DEP_SOURCE_ID: &str = "_tg_source-id";
    /// Dependency property: target step id.
    pub const DEP_TARGET_ID: &str = "_tg_target-id";
    /// Dependency property: source actor name.
    pub const DEP_SOURCE_ACTOR: &str = "_tg_source-actor";
    /// Dependency property: target actor name.
    pub const DEP_TARGET_ACTOR: &str = "_tg_target-actor";
    /// Dependency property: source action name.
    pub const DEP_SOURCE_ACTION: &str = "_tg_source-action";
    /// Dependency property: target action name.
    pub const DEP_TARGET_ACTION: &str = "_tg_target-action";
    /// Dependency property: guard expression (GUARD kind).
    pub const DEP_GUARD: &str = "_tg_guard";
    /// Dependency property: port name (PORT kind).
    pub const DEP_PORT: &str = "_tg_port";
    /// Dependency property: source port name (TOKENS kind).
    pub const DEP_SOURCE_PORT: &str = "_tg_source-port";
    /// Dependency property: target port name (TOKENS kind).
    pub const DEP_TARGET_PORT: &str = "_tg_target-port";
    /// Dependency property: token count (TOKENS kind).
    pub const DEP_TOKENS: &str = "_tg_tokens";
    /// Dependency property: variable name (VARIABLE kind).
    pub const DEP_VARIABLE: &str = "_tg_variable";
    /// Dependency property: direction literal (GUARD/PORT/VARIABLE kinds).
    pub const DEP_DIRECTION: &str = "_tg_direction";

    /// Edge tag written by the sorter instead of deleting semantic edges.
    pub const SORT_REMOVED: &str = "_tg_removed";

    /// Check whether a key is structural.
    pub fn is_reserved(key: &str) -> bool {
        key.starts_with(RESERVED_PREFIX)
    }
}
