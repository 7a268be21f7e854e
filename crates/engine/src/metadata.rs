//! Persisted trace metadata.
//!
//! Counts, per-actor and per-action step tallies, the sorted flag with its
//! chain endpoints, and the trace-level attribute map all live here. The
//! whole structure is kept in memory while a trace is open and written to a
//! small key/value text file next to the database on close, so reopening a
//! trace never requires scanning the graph.
//!
//! File format: one `key=value` line per entry. Composite keys are
//! dot-separated; `\`, `.`, `=` and newline inside a segment are
//! backslash-escaped. Attribute values are stored as single-line JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::warn;

use tracegraph_core::value::AttrValue;
use tracegraph_core::{Error, Result, StepId};

/// Name of the metadata file inside the database directory.
pub const PROPERTIES_FILE: &str = "trace.properties";

/// In-memory trace metadata, persisted as a properties file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceMetadata {
    steps: u64,
    dependencies: u64,
    sorted: bool,
    source_node: Option<StepId>,
    sink_node: Option<StepId>,
    actor_steps: BTreeMap<String, u64>,
    action_steps: BTreeMap<(String, String), u64>,
    attributes: BTreeMap<String, AttrValue>,
}

impl TraceMetadata {
    /// Empty metadata for a trace under construction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one step of the given actor and action.
    pub fn add_step(&mut self, actor: &str, action: &str) {
        self.steps += 1;
        *self.actor_steps.entry(actor.to_string()).or_insert(0) += 1;
        *self
            .action_steps
            .entry((actor.to_string(), action.to_string()))
            .or_insert(0) += 1;
    }

    /// Register one dependency.
    pub fn add_dependency(&mut self) {
        self.dependencies += 1;
    }

    /// Unregister one dependency (scheduler-edge removal).
    pub fn remove_dependency(&mut self) {
        self.dependencies = self.dependencies.saturating_sub(1);
    }

    /// Total number of steps.
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    /// Total number of dependencies.
    pub fn dependency_count(&self) -> u64 {
        self.dependencies
    }

    /// Number of steps fired by `actor`.
    pub fn steps_of_actor(&self, actor: &str) -> u64 {
        self.actor_steps.get(actor).copied().unwrap_or(0)
    }

    /// Number of steps firing `action` of `actor`.
    pub fn steps_of_action(&self, actor: &str, action: &str) -> u64 {
        self.action_steps
            .get(&(actor.to_string(), action.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Actors present in the trace, with their step counts.
    pub fn actors(&self) -> &BTreeMap<String, u64> {
        &self.actor_steps
    }

    /// Whether a materialized topological order exists.
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Record a completed sort and its chain endpoints.
    pub fn mark_sorted(&mut self, source: StepId, sink: StepId) {
        self.sorted = true;
        self.source_node = Some(source);
        self.sink_node = Some(sink);
    }

    /// First step of the chain, if sorted.
    pub fn source_node(&self) -> Option<StepId> {
        self.source_node
    }

    /// Last step of the chain, if sorted.
    pub fn sink_node(&self) -> Option<StepId> {
        self.sink_node
    }

    /// Set a trace-level attribute.
    pub fn set_attribute(&mut self, name: &str, value: AttrValue) {
        self.attributes.insert(name.to_string(), value);
    }

    /// Get a trace-level attribute.
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// All trace-level attributes.
    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    /// Write the metadata file atomically (temp file, then rename).
    pub fn store(&self, path: &Path) -> Result<()> {
        let mut out = String::new();
        out.push_str(&format!("steps={}\n", self.steps));
        out.push_str(&format!("dependencies={}\n", self.dependencies));
        out.push_str(&format!("sorted={}\n", self.sorted));
        if let Some(id) = self.source_node {
            out.push_str(&format!("source-node={id}\n"));
        }
        if let Some(id) = self.sink_node {
            out.push_str(&format!("sink-node={id}\n"));
        }
        for (actor, count) in &self.actor_steps {
            out.push_str(&format!("actor-steps.{}={count}\n", escape(actor)));
        }
        for ((actor, action), count) in &self.action_steps {
            out.push_str(&format!(
                "action-steps.{}.{}={count}\n",
                escape(actor),
                escape(action)
            ));
        }
        for (name, value) in &self.attributes {
            let json = serde_json::to_string(value)
                .map_err(|e| Error::Serialization(format!("trace attribute {name}: {e}")))?;
            out.push_str(&format!("attribute.{}={json}\n", escape(name)));
        }

        let tmp = path.with_extension("properties.tmp");
        fs::write(&tmp, out.as_bytes())?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read the metadata file back.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::StorageUnavailable(format!("metadata file {}: {e}", path.display()))
        })?;
        let mut meta = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (segments, value) = parse_line(line).ok_or_else(|| {
                Error::Storage(format!("malformed metadata line {}", lineno + 1))
            })?;
            let parts: Vec<&str> = segments.iter().map(String::as_str).collect();
            match parts.as_slice() {
                ["steps"] => meta.steps = parse_u64(&value, lineno)?,
                ["dependencies"] => meta.dependencies = parse_u64(&value, lineno)?,
                ["sorted"] => meta.sorted = value == "true",
                ["source-node"] => meta.source_node = Some(parse_u64(&value, lineno)?),
                ["sink-node"] => meta.sink_node = Some(parse_u64(&value, lineno)?),
                ["actor-steps", actor] => {
                    meta.actor_steps
                        .insert((*actor).to_string(), parse_u64(&value, lineno)?);
                }
                ["action-steps", actor, action] => {
                    meta.action_steps.insert(
                        ((*actor).to_string(), (*action).to_string()),
                        parse_u64(&value, lineno)?,
                    );
                }
                ["attribute", name] => match serde_json::from_str::<AttrValue>(&value) {
                    Ok(attr) => {
                        meta.attributes.insert((*name).to_string(), attr);
                    }
                    Err(e) => {
                        warn!(attribute = *name, error = %e, "unreadable trace attribute, skipped")
                    }
                },
                _ => warn!(line = lineno + 1, "unrecognized metadata key, skipped"),
            }
        }
        Ok(meta)
    }
}

fn parse_u64(value: &str, lineno: usize) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| Error::Storage(format!("malformed metadata count at line {}", lineno + 1)))
}

fn escape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '.' => out.push_str("\\."),
            '=' => out.push_str("\\="),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// Split a line into unescaped key segments and the raw value. The value
/// starts after the first unescaped `=` and is taken verbatim.
fn parse_line(line: &str) -> Option<(Vec<String>, String)> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = line.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => current.push('\n'),
                Some((_, escaped)) => current.push(escaped),
                None => return None,
            },
            '.' => {
                segments.push(std::mem::take(&mut current));
            }
            '=' => {
                segments.push(current);
                return Some((segments, line[i + 1..].to_string()));
            }
            c => current.push(c),
        }
    }
    // no unescaped '=' anywhere
    None
}
