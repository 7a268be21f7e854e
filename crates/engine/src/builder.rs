//! Bulk trace construction.
//!
//! [`TraceBuilder`] is the write-once ingestion path: steps in dense id
//! order, then dependencies between registered steps, then [`build`] to
//! flush everything and reopen the database as a [`Trace`]. The builder
//! writes through the same storage backend and coalescer as the reader, so
//! ingestion of arbitrarily large traces runs in bounded memory.
//!
//! [`build`]: TraceBuilder::build

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use tracegraph_core::types::{keys, Direction};
use tracegraph_core::value::{AttrValue, PropValue};
use tracegraph_core::{codec, Error, Result, StepId};
use tracegraph_storage::{EdgeType, GraphStorage, PagedGraph, TransactionCoalescer};

use crate::config::TraceConfig;
use crate::metadata::{TraceMetadata, PROPERTIES_FILE};
use crate::trace::{db_dir_for, Trace};

/// Everything known about one step at ingestion time.
#[derive(Debug, Clone, Default)]
pub struct StepData {
    /// Dense step id; must equal the number of steps added so far.
    pub id: StepId,
    /// Actor instance name.
    pub actor: String,
    /// Fired action name.
    pub action: String,
    /// Actor class name.
    pub actor_class: String,
    /// Tokens read per input port.
    pub read_tokens: BTreeMap<String, i64>,
    /// Tokens written per output port.
    pub write_tokens: BTreeMap<String, i64>,
    /// Variables read.
    pub read_variables: Vec<String>,
    /// Variables written.
    pub write_variables: Vec<String>,
    /// User attributes.
    pub attributes: HashMap<String, AttrValue>,
}

/// One end of a dependency at ingestion time.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Step id of this end.
    pub id: StepId,
    /// Actor name, denormalized onto the edge.
    pub actor: String,
    /// Action name, denormalized onto the edge.
    pub action: String,
}

impl Endpoint {
    /// Convenience constructor.
    pub fn new(id: StepId, actor: &str, action: &str) -> Self {
        Self {
            id,
            actor: actor.to_string(),
            action: action.to_string(),
        }
    }
}

/// Kind-specific payload of a dependency being added.
enum Payload<'a> {
    Fsm,
    Guard {
        guard: &'a str,
        direction: Direction,
    },
    Port {
        port: &'a str,
        direction: Direction,
    },
    Variable {
        variable: &'a str,
        direction: Direction,
    },
    Tokens {
        source_port: &'a str,
        target_port: &'a str,
        count: i64,
    },
}

impl Payload<'_> {
    fn edge_type(&self) -> EdgeType {
        match self {
            Payload::Fsm => EdgeType::Fsm,
            Payload::Guard { .. } => EdgeType::Guard,
            Payload::Port { .. } => EdgeType::Port,
            Payload::Variable { .. } => EdgeType::Variable,
            Payload::Tokens { .. } => EdgeType::Tokens,
        }
    }
}

struct BuildState {
    storage: PagedGraph,
    meta: TraceMetadata,
    coalescer: TransactionCoalescer,
    config: TraceConfig,
}

/// Write-once constructor for a trace database.
pub struct TraceBuilder {
    trace_file: PathBuf,
    db_dir: PathBuf,
    state: Option<BuildState>,
    started: Option<Instant>,
}

impl TraceBuilder {
    /// A builder for the database of `trace_file`. Nothing touches the disk
    /// until [`configure`](TraceBuilder::configure) is called.
    pub fn new(trace_file: &Path) -> Self {
        Self {
            trace_file: trace_file.to_path_buf(),
            db_dir: db_dir_for(trace_file),
            state: None,
            started: None,
        }
    }

    /// The database directory this builder writes to.
    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    /// Create the backing database. Must be called exactly once, before any
    /// step or dependency is added.
    pub fn configure(&mut self, config: &TraceConfig) -> Result<()> {
        if self.state.is_some() {
            return Err(Error::InvalidState("builder is already configured".into()));
        }
        info!(db_dir = %self.db_dir.display(), "creating trace database");
        let storage = PagedGraph::create(&self.db_dir)?;
        self.state = Some(BuildState {
            storage,
            meta: TraceMetadata::new(),
            coalescer: TransactionCoalescer::new(config.max_uncommitted, config.log_every),
            config: config.clone(),
        });
        self.started = Some(Instant::now());
        Ok(())
    }

    fn state(&mut self) -> Result<&mut BuildState> {
        self.state
            .as_mut()
            .ok_or_else(|| Error::InvalidState("builder is not configured".into()))
    }

    /// Add the next step. Ids are dense: `step.id` must equal the number of
    /// steps already added.
    pub fn add_step(&mut self, step: StepData) -> Result<()> {
        let state = self.state()?;
        let expected = state.meta.step_count();
        if step.id != expected {
            return Err(Error::InvalidState(format!(
                "step id {} out of order, expected {expected}",
                step.id
            )));
        }

        let mut props = vec![
            (keys::STEP_ID.to_string(), PropValue::Int(step.id as i64)),
            (keys::STEP_ACTOR.to_string(), PropValue::Text(step.actor.clone())),
            (keys::STEP_ACTION.to_string(), PropValue::Text(step.action.clone())),
            (
                keys::STEP_ACTOR_CLASS.to_string(),
                PropValue::Text(step.actor_class),
            ),
        ];
        // empty collections stay unstored; readers treat absence as empty
        if !step.read_tokens.is_empty() {
            push_collection(
                &mut props,
                step.id,
                keys::STEP_READ_TOKENS,
                codec::encode(&AttrValue::StringIntMap(step.read_tokens)),
            );
        }
        if !step.write_tokens.is_empty() {
            push_collection(
                &mut props,
                step.id,
                keys::STEP_WRITE_TOKENS,
                codec::encode(&AttrValue::StringIntMap(step.write_tokens)),
            );
        }
        if !step.read_variables.is_empty() {
            push_collection(
                &mut props,
                step.id,
                keys::STEP_READ_VARIABLES,
                codec::encode(&AttrValue::StringList(step.read_variables)),
            );
        }
        if !step.write_variables.is_empty() {
            push_collection(
                &mut props,
                step.id,
                keys::STEP_WRITE_VARIABLES,
                codec::encode(&AttrValue::StringList(step.write_variables)),
            );
        }
        props.extend(filter_user_attributes(step.attributes));

        state.storage.create_node(step.id, props)?;
        state.meta.add_step(&step.actor, &step.action);
        state.coalescer.record(&mut state.storage)?;
        Ok(())
    }

    /// Add an FSM dependency.
    pub fn add_fsm_dependency(
        &mut self,
        source: Endpoint,
        target: Endpoint,
        attributes: HashMap<String, AttrValue>,
    ) -> Result<()> {
        self.add_dependency(source, target, Payload::Fsm, attributes)
    }

    /// Add a guard dependency.
    pub fn add_guard_dependency(
        &mut self,
        source: Endpoint,
        target: Endpoint,
        guard: &str,
        direction: Direction,
        attributes: HashMap<String, AttrValue>,
    ) -> Result<()> {
        self.add_dependency(source, target, Payload::Guard { guard, direction }, attributes)
    }

    /// Add a port dependency.
    pub fn add_port_dependency(
        &mut self,
        source: Endpoint,
        target: Endpoint,
        port: &str,
        direction: Direction,
        attributes: HashMap<String, AttrValue>,
    ) -> Result<()> {
        self.add_dependency(source, target, Payload::Port { port, direction }, attributes)
    }

    /// Add a variable dependency.
    pub fn add_variable_dependency(
        &mut self,
        source: Endpoint,
        target: Endpoint,
        variable: &str,
        direction: Direction,
        attributes: HashMap<String, AttrValue>,
    ) -> Result<()> {
        self.add_dependency(
            source,
            target,
            Payload::Variable { variable, direction },
            attributes,
        )
    }

    /// Add a tokens dependency.
    pub fn add_tokens_dependency(
        &mut self,
        source: Endpoint,
        target: Endpoint,
        source_port: &str,
        target_port: &str,
        count: i64,
        attributes: HashMap<String, AttrValue>,
    ) -> Result<()> {
        self.add_dependency(
            source,
            target,
            Payload::Tokens {
                source_port,
                target_port,
                count,
            },
            attributes,
        )
    }

    fn add_dependency(
        &mut self,
        source: Endpoint,
        target: Endpoint,
        payload: Payload<'_>,
        attributes: HashMap<String, AttrValue>,
    ) -> Result<()> {
        let state = self.state()?;
        let mut props = vec![
            (keys::DEP_SOURCE_ID.to_string(), PropValue::Int(source.id as i64)),
            (keys::DEP_TARGET_ID.to_string(), PropValue::Int(target.id as i64)),
            (keys::DEP_SOURCE_ACTOR.to_string(), PropValue::Text(source.actor)),
            (
                keys::DEP_SOURCE_ACTION.to_string(),
                PropValue::Text(source.action),
            ),
            (keys::DEP_TARGET_ACTOR.to_string(), PropValue::Text(target.actor)),
            (
                keys::DEP_TARGET_ACTION.to_string(),
                PropValue::Text(target.action),
            ),
        ];
        match &payload {
            Payload::Fsm => {}
            Payload::Guard { guard, direction } => {
                props.push((keys::DEP_GUARD.to_string(), PropValue::Text((*guard).into())));
                props.push((
                    keys::DEP_DIRECTION.to_string(),
                    PropValue::Text(direction.as_str().into()),
                ));
            }
            Payload::Port { port, direction } => {
                props.push((keys::DEP_PORT.to_string(), PropValue::Text((*port).into())));
                props.push((
                    keys::DEP_DIRECTION.to_string(),
                    PropValue::Text(direction.as_str().into()),
                ));
            }
            Payload::Variable {
                variable,
                direction,
            } => {
                props.push((
                    keys::DEP_VARIABLE.to_string(),
                    PropValue::Text((*variable).into()),
                ));
                props.push((
                    keys::DEP_DIRECTION.to_string(),
                    PropValue::Text(direction.as_str().into()),
                ));
            }
            Payload::Tokens {
                source_port,
                target_port,
                count,
            } => {
                props.push((
                    keys::DEP_SOURCE_PORT.to_string(),
                    PropValue::Text((*source_port).into()),
                ));
                props.push((
                    keys::DEP_TARGET_PORT.to_string(),
                    PropValue::Text((*target_port).into()),
                ));
                props.push((keys::DEP_TOKENS.to_string(), PropValue::Int(*count)));
            }
        }
        props.extend(filter_user_attributes(attributes));

        state
            .storage
            .create_edge(source.id, target.id, payload.edge_type(), props)?;
        state.meta.add_dependency();
        state.coalescer.record(&mut state.storage)?;
        Ok(())
    }

    /// Set trace-level attributes.
    pub fn add_attributes(&mut self, attributes: HashMap<String, AttrValue>) -> Result<()> {
        let state = self.state()?;
        for (name, value) in attributes {
            state.meta.set_attribute(&name, value);
        }
        Ok(())
    }

    /// Flush everything, shut the database down and reopen it as a
    /// [`Trace`].
    pub fn build(mut self) -> Result<Trace> {
        let mut state = self
            .state
            .take()
            .ok_or_else(|| Error::InvalidState("builder is not configured".into()))?;

        state.coalescer.flush(&mut state.storage)?;
        state.storage.shutdown()?;
        state.meta.store(&self.db_dir.join(PROPERTIES_FILE))?;

        if let Some(started) = self.started {
            info!(
                steps = state.meta.step_count(),
                dependencies = state.meta.dependency_count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "trace database built"
            );
        }
        Trace::open(&self.trace_file, &state.config)
    }
}

/// Encode user attributes, dropping reserved names (logged) and entries that
/// fail to serialize (logged by the codec).
fn filter_user_attributes(attributes: HashMap<String, AttrValue>) -> Vec<(String, PropValue)> {
    let (user, reserved): (HashMap<_, _>, HashMap<_, _>) = attributes
        .into_iter()
        .partition(|(name, _)| !keys::is_reserved(name));
    for name in reserved.keys() {
        debug!(name, "reserved attribute name rejected");
    }
    codec::encode_attributes(&user)
}

/// Push an encoded structural collection. A collection the codec cannot
/// serialize degrades to an absent property (logged), never a failed step.
fn push_collection(
    props: &mut Vec<(String, PropValue)>,
    id: StepId,
    key: &str,
    encoded: Result<PropValue>,
) {
    match encoded {
        Ok(prop) => props.push((key.to_string(), prop)),
        Err(e) => warn!(step = id, key, error = %e, "collection cannot be serialized, skipped"),
    }
}
