//! Step views.
//!
//! A [`Step`] pairs the shared trace state with a cached, per-id
//! [`StepState`]. The state memoizes the incoming and outgoing dependency
//! edge lists on first use; attribute reads always go to storage so that
//! concurrent writers through other views are observed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, error, warn};

use tracegraph_core::types::keys;
use tracegraph_core::value::AttrValue;
use tracegraph_core::{codec, EdgeId, StepId};
use tracegraph_storage::{Dir, EdgeType};

use crate::dependency::Dependency;
use crate::trace::TraceInner;

/// Cached per-step state. Holds no reference back into the trace.
pub(crate) struct StepState {
    id: StepId,
    incoming: OnceCell<Vec<EdgeId>>,
    outgoing: OnceCell<Vec<EdgeId>>,
}

impl StepState {
    pub(crate) fn new(id: StepId) -> Self {
        Self {
            id,
            incoming: OnceCell::new(),
            outgoing: OnceCell::new(),
        }
    }
}

/// One executed step of the traced program.
#[derive(Clone)]
pub struct Step {
    trace: Arc<TraceInner>,
    state: Arc<StepState>,
}

impl Step {
    pub(crate) fn new(trace: Arc<TraceInner>, state: Arc<StepState>) -> Self {
        Self { trace, state }
    }

    /// Dense step id.
    pub fn id(&self) -> StepId {
        self.state.id
    }

    /// Name of the actor that fired this step.
    pub fn actor(&self) -> String {
        self.trace
            .node_text(self.state.id, keys::STEP_ACTOR)
            .unwrap_or_default()
    }

    /// Name of the fired action.
    pub fn action(&self) -> String {
        self.trace
            .node_text(self.state.id, keys::STEP_ACTION)
            .unwrap_or_default()
    }

    /// Class name of the actor.
    pub fn actor_class(&self) -> String {
        self.trace
            .node_text(self.state.id, keys::STEP_ACTOR_CLASS)
            .unwrap_or_default()
    }

    /// Tokens read per input port. Empty if the step read none.
    pub fn read_tokens(&self) -> BTreeMap<String, i64> {
        self.token_map(keys::STEP_READ_TOKENS)
    }

    /// Tokens written per output port. Empty if the step wrote none.
    pub fn write_tokens(&self) -> BTreeMap<String, i64> {
        self.token_map(keys::STEP_WRITE_TOKENS)
    }

    /// Variables read by this step.
    pub fn read_variables(&self) -> Vec<String> {
        self.variable_list(keys::STEP_READ_VARIABLES)
    }

    /// Variables written by this step.
    pub fn write_variables(&self) -> Vec<String> {
        self.variable_list(keys::STEP_WRITE_VARIABLES)
    }

    fn token_map(&self, key: &str) -> BTreeMap<String, i64> {
        match self.decoded_prop(key) {
            Some(AttrValue::StringIntMap(m)) => m,
            Some(other) => {
                error!(step = self.state.id, key, found = other.type_name(),
                    "token map property holds the wrong shape");
                BTreeMap::new()
            }
            None => BTreeMap::new(),
        }
    }

    fn variable_list(&self, key: &str) -> Vec<String> {
        match self.decoded_prop(key) {
            Some(AttrValue::StringList(l)) => l,
            Some(other) => {
                error!(step = self.state.id, key, found = other.type_name(),
                    "variable list property holds the wrong shape");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    fn decoded_prop(&self, key: &str) -> Option<AttrValue> {
        let prop = match self.trace.read(|s| s.node_prop(self.state.id, key)) {
            Ok(p) => p?,
            Err(e) => {
                error!(step = self.state.id, key, error = %e, "property read failed");
                return None;
            }
        };
        match codec::decode(&prop) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(step = self.state.id, key, error = %e, "property cannot be deserialized");
                None
            }
        }
    }

    /// Get an attribute by exact key. Reserved keys are readable here but
    /// never enumerated or writable.
    pub fn attribute(&self, name: &str) -> Option<AttrValue> {
        self.decoded_prop(name)
    }

    /// Check whether an attribute is present.
    pub fn has_attribute(&self, name: &str) -> bool {
        matches!(
            self.trace.read(|s| s.node_prop(self.state.id, name)),
            Ok(Some(_))
        )
    }

    /// Names of all user attributes on this step.
    pub fn attribute_names(&self) -> Vec<String> {
        match self.trace.read(|s| s.node_prop_keys(self.state.id)) {
            Ok(names) => names,
            Err(e) => {
                error!(step = self.state.id, error = %e, "attribute enumeration failed");
                Vec::new()
            }
        }
    }

    /// All user attributes, decoded. Unreadable entries are logged and
    /// skipped.
    pub fn attributes(&self) -> HashMap<String, AttrValue> {
        let props = match self.trace.read(|s| {
            let names = s.node_prop_keys(self.state.id)?;
            let mut out = Vec::with_capacity(names.len());
            for name in names {
                if let Some(value) = s.node_prop(self.state.id, &name)? {
                    out.push((name, value));
                }
            }
            Ok::<_, tracegraph_core::Error>(out)
        }) {
            Ok(props) => props,
            Err(e) => {
                error!(step = self.state.id, error = %e, "attribute enumeration failed");
                return HashMap::new();
            }
        };
        codec::decode_attributes(props)
    }

    /// Set a user attribute. Returns `false` (logged) for reserved names or
    /// values that cannot be serialized.
    pub fn set_attribute(&self, name: &str, value: AttrValue) -> bool {
        if keys::is_reserved(name) {
            debug!(step = self.state.id, name, "reserved attribute name rejected");
            return false;
        }
        let prop = match codec::encode(&value) {
            Ok(p) => p,
            Err(e) => {
                warn!(step = self.state.id, name, error = %e, "attribute cannot be serialized");
                return false;
            }
        };
        match self
            .trace
            .mutate(|s| s.set_node_prop(self.state.id, name, prop))
        {
            Ok(()) => true,
            Err(e) => {
                error!(step = self.state.id, name, error = %e, "attribute write failed");
                false
            }
        }
    }

    /// Remove a user attribute. Returns `true` only if it existed.
    pub fn remove_attribute(&self, name: &str) -> bool {
        if keys::is_reserved(name) {
            debug!(step = self.state.id, name, "reserved attribute name rejected");
            return false;
        }
        match self
            .trace
            .mutate(|s| s.remove_node_prop(self.state.id, name))
        {
            Ok(previous) => previous.is_some(),
            Err(e) => {
                error!(step = self.state.id, name, error = %e, "attribute removal failed");
                false
            }
        }
    }

    /// Remove every user attribute from this step.
    pub fn remove_attributes(&self) {
        for name in self.attribute_names() {
            self.remove_attribute(&name);
        }
    }

    /// Dependencies arriving at this step, in creation order.
    pub fn incoming(&self) -> Vec<Dependency> {
        self.dependencies(Dir::Incoming, &self.state.incoming)
    }

    /// Dependencies leaving this step, in creation order.
    pub fn outgoing(&self) -> Vec<Dependency> {
        self.dependencies(Dir::Outgoing, &self.state.outgoing)
    }

    fn dependencies(&self, dir: Dir, cell: &OnceCell<Vec<EdgeId>>) -> Vec<Dependency> {
        let edges = cell.get_or_try_init(|| {
            self.trace
                .read(|s| s.edges(self.state.id, dir, &EdgeType::ORDERING))
        });
        match edges {
            Ok(edges) => edges.iter().map(|e| self.trace.dep_view(*e)).collect(),
            Err(e) => {
                error!(step = self.state.id, error = %e, "dependency traversal failed");
                Vec::new()
            }
        }
    }
}

impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        self.state.id == other.state.id
    }
}

impl Eq for Step {}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.state.id)
            .field("actor", &self.actor())
            .field("action", &self.action())
            .finish()
    }
}
