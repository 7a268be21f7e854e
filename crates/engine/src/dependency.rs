//! Dependency views.
//!
//! A [`Dependency`] is a view over one stored edge. Endpoint ids, actor and
//! action names are denormalized onto the edge at creation time, so most
//! accessors are a single exact-key property read with no node lookup.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use tracegraph_core::types::{keys, DependencyKind, Direction};
use tracegraph_core::value::AttrValue;
use tracegraph_core::{codec, EdgeId, StepId};

use crate::step::Step;
use crate::trace::TraceInner;

/// Cached per-edge state. Holds no reference back into the trace.
pub(crate) struct DepState {
    edge: EdgeId,
}

impl DepState {
    pub(crate) fn new(edge: EdgeId) -> Self {
        Self { edge }
    }
}

/// One dependency between two steps.
#[derive(Clone)]
pub struct Dependency {
    trace: Arc<TraceInner>,
    state: Arc<DepState>,
}

impl Dependency {
    pub(crate) fn new(trace: Arc<TraceInner>, state: Arc<DepState>) -> Self {
        Self { trace, state }
    }

    /// Storage-level edge reference.
    pub fn id(&self) -> EdgeId {
        self.state.edge
    }

    /// Kind of this dependency.
    pub fn kind(&self) -> DependencyKind {
        match self.trace.read(|s| s.edge_type(self.state.edge)) {
            Ok(edge_type) => edge_type.kind().unwrap_or_else(|| {
                error!(edge = %self.state.edge, "structural edge exposed as dependency");
                DependencyKind::Unknown
            }),
            Err(e) => {
                error!(edge = %self.state.edge, error = %e, "edge type read failed");
                DependencyKind::Unknown
            }
        }
    }

    /// Id of the step this dependency leaves.
    pub fn source_id(&self) -> Option<StepId> {
        self.endpoint_id(keys::DEP_SOURCE_ID)
    }

    /// Id of the step this dependency arrives at.
    pub fn target_id(&self) -> Option<StepId> {
        self.endpoint_id(keys::DEP_TARGET_ID)
    }

    fn endpoint_id(&self, key: &str) -> Option<StepId> {
        match self.trace.edge_int(self.state.edge, key) {
            Some(id) if id >= 0 => Some(id as StepId),
            Some(id) => {
                error!(edge = %self.state.edge, key, id, "negative endpoint id");
                None
            }
            None => None,
        }
    }

    /// The source step view.
    pub fn source(&self) -> Option<Step> {
        self.trace.step_view(self.source_id()?)
    }

    /// The target step view.
    pub fn target(&self) -> Option<Step> {
        self.trace.step_view(self.target_id()?)
    }

    /// Actor name of the source step.
    pub fn source_actor(&self) -> String {
        self.text(keys::DEP_SOURCE_ACTOR)
    }

    /// Action name of the source step.
    pub fn source_action(&self) -> String {
        self.text(keys::DEP_SOURCE_ACTION)
    }

    /// Actor name of the target step.
    pub fn target_actor(&self) -> String {
        self.text(keys::DEP_TARGET_ACTOR)
    }

    /// Action name of the target step.
    pub fn target_action(&self) -> String {
        self.text(keys::DEP_TARGET_ACTION)
    }

    fn text(&self, key: &str) -> String {
        self.trace
            .edge_text(self.state.edge, key)
            .unwrap_or_default()
    }

    /// Guard expression, for guard dependencies.
    pub fn guard(&self) -> Option<String> {
        self.trace.edge_text(self.state.edge, keys::DEP_GUARD)
    }

    /// Port name, for port dependencies.
    pub fn port(&self) -> Option<String> {
        self.trace.edge_text(self.state.edge, keys::DEP_PORT)
    }

    /// Variable name, for variable dependencies.
    pub fn variable(&self) -> Option<String> {
        self.trace.edge_text(self.state.edge, keys::DEP_VARIABLE)
    }

    /// Source port name, for tokens dependencies.
    pub fn source_port(&self) -> Option<String> {
        self.trace.edge_text(self.state.edge, keys::DEP_SOURCE_PORT)
    }

    /// Target port name, for tokens dependencies.
    pub fn target_port(&self) -> Option<String> {
        self.trace.edge_text(self.state.edge, keys::DEP_TARGET_PORT)
    }

    /// Number of tokens carried, for tokens dependencies.
    pub fn count(&self) -> Option<i64> {
        self.trace.edge_int(self.state.edge, keys::DEP_TOKENS)
    }

    /// Access direction, for guard, port and variable dependencies.
    pub fn direction(&self) -> Option<Direction> {
        let literal = self.trace.edge_text(self.state.edge, keys::DEP_DIRECTION)?;
        let parsed = Direction::parse(&literal);
        if parsed.is_none() {
            error!(edge = %self.state.edge, literal, "unparseable direction literal");
        }
        parsed
    }

    /// Get an attribute by exact key.
    pub fn attribute(&self, name: &str) -> Option<AttrValue> {
        let prop = match self.trace.read(|s| s.edge_prop(self.state.edge, name)) {
            Ok(p) => p?,
            Err(e) => {
                error!(edge = %self.state.edge, name, error = %e, "property read failed");
                return None;
            }
        };
        match codec::decode(&prop) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(edge = %self.state.edge, name, error = %e, "property cannot be deserialized");
                None
            }
        }
    }

    /// Check whether an attribute is present.
    pub fn has_attribute(&self, name: &str) -> bool {
        matches!(
            self.trace.read(|s| s.edge_prop(self.state.edge, name)),
            Ok(Some(_))
        )
    }

    /// Names of all user attributes on this dependency.
    pub fn attribute_names(&self) -> Vec<String> {
        match self.trace.read(|s| s.edge_prop_keys(self.state.edge)) {
            Ok(names) => names,
            Err(e) => {
                error!(edge = %self.state.edge, error = %e, "attribute enumeration failed");
                Vec::new()
            }
        }
    }

    /// All user attributes, decoded. Unreadable entries are logged and
    /// skipped.
    pub fn attributes(&self) -> HashMap<String, AttrValue> {
        let props = match self.trace.read(|s| {
            let names = s.edge_prop_keys(self.state.edge)?;
            let mut out = Vec::with_capacity(names.len());
            for name in names {
                if let Some(value) = s.edge_prop(self.state.edge, &name)? {
                    out.push((name, value));
                }
            }
            Ok::<_, tracegraph_core::Error>(out)
        }) {
            Ok(props) => props,
            Err(e) => {
                error!(edge = %self.state.edge, error = %e, "attribute enumeration failed");
                return HashMap::new();
            }
        };
        codec::decode_attributes(props)
    }

    /// Set a user attribute. Returns `false` (logged) for reserved names or
    /// values that cannot be serialized.
    pub fn set_attribute(&self, name: &str, value: AttrValue) -> bool {
        if keys::is_reserved(name) {
            debug!(edge = %self.state.edge, name, "reserved attribute name rejected");
            return false;
        }
        let prop = match codec::encode(&value) {
            Ok(p) => p,
            Err(e) => {
                warn!(edge = %self.state.edge, name, error = %e, "attribute cannot be serialized");
                return false;
            }
        };
        match self
            .trace
            .mutate(|s| s.set_edge_prop(self.state.edge, name, prop))
        {
            Ok(()) => true,
            Err(e) => {
                error!(edge = %self.state.edge, name, error = %e, "attribute write failed");
                false
            }
        }
    }

    /// Remove a user attribute. Returns `true` only if it existed.
    pub fn remove_attribute(&self, name: &str) -> bool {
        if keys::is_reserved(name) {
            debug!(edge = %self.state.edge, name, "reserved attribute name rejected");
            return false;
        }
        match self
            .trace
            .mutate(|s| s.remove_edge_prop(self.state.edge, name))
        {
            Ok(previous) => previous.is_some(),
            Err(e) => {
                error!(edge = %self.state.edge, name, error = %e, "attribute removal failed");
                false
            }
        }
    }

    /// Remove every user attribute from this dependency.
    pub fn remove_attributes(&self) {
        for name in self.attribute_names() {
            self.remove_attribute(&name);
        }
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.state.edge == other.state.edge
    }
}

impl Eq for Dependency {}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("edge", &self.state.edge)
            .field("kind", &self.kind())
            .finish()
    }
}
