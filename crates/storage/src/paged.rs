//! Disk-backed [`GraphStorage`] implementation.
//!
//! Adjacency and properties live in `FxHashMap`s sized for point lookups and
//! degree counts; durability comes from the append-only record log in this
//! directory. Reopening replays the log, so the store survives process
//! restarts up to the last committed frame.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::graph::{Dir, EdgeType, GraphStorage};
use crate::log::{replay, LogRecord, LogWriter};
use tracegraph_core::types::keys;
use tracegraph_core::value::PropValue;
use tracegraph_core::{EdgeId, Error, Result, StepId};

/// File name of the record log inside the storage directory.
pub const LOG_FILE: &str = "graph.log";

#[derive(Debug, Default)]
struct NodeRecord {
    props: FxHashMap<String, PropValue>,
    outgoing: Vec<EdgeId>,
    incoming: Vec<EdgeId>,
}

#[derive(Debug)]
struct EdgeRecord {
    source: StepId,
    target: StepId,
    edge_type: EdgeType,
    props: FxHashMap<String, PropValue>,
}

/// Disk-backed graph store.
pub struct PagedGraph {
    dir: PathBuf,
    nodes: FxHashMap<StepId, NodeRecord>,
    edges: FxHashMap<EdgeId, EdgeRecord>,
    next_edge: u64,
    writer: Option<LogWriter>,
}

impl std::fmt::Debug for PagedGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedGraph")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl PagedGraph {
    /// Create a fresh store in `dir`, truncating any previous log.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let writer = LogWriter::create(&dir.join(LOG_FILE))?;
        info!(dir = %dir.display(), "graph store created");
        Ok(Self {
            dir: dir.to_path_buf(),
            nodes: FxHashMap::default(),
            edges: FxHashMap::default(),
            next_edge: 0,
            writer: Some(writer),
        })
    }

    /// Open an existing store, replaying its log.
    pub fn open(dir: &Path) -> Result<Self> {
        let log_path = dir.join(LOG_FILE);
        if !dir.is_dir() || !log_path.is_file() {
            return Err(Error::StorageUnavailable(format!(
                "no graph store at {}",
                dir.display()
            )));
        }

        let (records, valid_len) = replay(&log_path)?;
        let mut store = Self {
            dir: dir.to_path_buf(),
            nodes: FxHashMap::default(),
            edges: FxHashMap::default(),
            next_edge: 0,
            writer: None,
        };
        let count = records.len();
        for record in records {
            store.apply(record)?;
        }
        store.writer = Some(LogWriter::open_append(&log_path, valid_len)?);
        info!(
            dir = %dir.display(),
            records = count,
            nodes = store.nodes.len(),
            edges = store.edges.len(),
            "graph store opened"
        );
        Ok(store)
    }

    /// Directory holding this store's files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log(&mut self, record: &LogRecord) -> Result<()> {
        match self.writer.as_mut() {
            Some(w) => w.append(record),
            None => Err(Error::InvalidState("graph store is shut down".into())),
        }
    }

    /// Mutate in-memory state for an already-validated record. Shared
    /// between live mutation and log replay.
    fn apply(&mut self, record: LogRecord) -> Result<()> {
        match record {
            LogRecord::CreateNode { id, props } => {
                let node = NodeRecord {
                    props: props.into_iter().collect(),
                    ..NodeRecord::default()
                };
                if self.nodes.insert(id, node).is_some() {
                    return Err(Error::Storage(format!("duplicate node {id}")));
                }
            }
            LogRecord::CreateEdge {
                id,
                source,
                target,
                edge_type,
                props,
            } => {
                let edge = EdgeRecord {
                    source,
                    target,
                    edge_type,
                    props: props.into_iter().collect(),
                };
                if self.edges.insert(id, edge).is_some() {
                    return Err(Error::Storage(format!("duplicate edge {id}")));
                }
                self.node_mut(source)?.outgoing.push(id);
                self.node_mut(target)?.incoming.push(id);
                self.next_edge = self.next_edge.max(id.0 + 1);
            }
            LogRecord::DeleteEdge { id } => {
                let edge = self
                    .edges
                    .remove(&id)
                    .ok_or_else(|| Error::Storage(format!("unknown edge {id}")))?;
                self.node_mut(edge.source)?.outgoing.retain(|e| *e != id);
                self.node_mut(edge.target)?.incoming.retain(|e| *e != id);
            }
            LogRecord::SetNodeProp { id, key, value } => {
                self.node_mut(id)?.props.insert(key, value);
            }
            LogRecord::RemoveNodeProp { id, key } => {
                self.node_mut(id)?.props.remove(&key);
            }
            LogRecord::SetEdgeProp { id, key, value } => {
                self.edge_mut(id)?.props.insert(key, value);
            }
            LogRecord::RemoveEdgeProp { id, key } => {
                self.edge_mut(id)?.props.remove(&key);
            }
        }
        Ok(())
    }

    fn node(&self, id: StepId) -> Result<&NodeRecord> {
        self.nodes.get(&id).ok_or(Error::Lookup(id))
    }

    fn node_mut(&mut self, id: StepId) -> Result<&mut NodeRecord> {
        self.nodes.get_mut(&id).ok_or(Error::Lookup(id))
    }

    fn edge(&self, id: EdgeId) -> Result<&EdgeRecord> {
        self.edges
            .get(&id)
            .ok_or_else(|| Error::Storage(format!("unknown edge {id}")))
    }

    fn edge_mut(&mut self, id: EdgeId) -> Result<&mut EdgeRecord> {
        self.edges
            .get_mut(&id)
            .ok_or_else(|| Error::Storage(format!("unknown edge {id}")))
    }

    fn adjacency(&self, id: StepId, dir: Dir) -> Result<&[EdgeId]> {
        let node = self.node(id)?;
        Ok(match dir {
            Dir::Outgoing => &node.outgoing,
            Dir::Incoming => &node.incoming,
        })
    }
}

impl GraphStorage for PagedGraph {
    fn create_node(&mut self, id: StepId, props: Vec<(String, PropValue)>) -> Result<()> {
        if self.nodes.contains_key(&id) {
            return Err(Error::Storage(format!("duplicate node {id}")));
        }
        let record = LogRecord::CreateNode { id, props };
        self.log(&record)?;
        self.apply(record)
    }

    fn node_exists(&self, id: StepId) -> bool {
        self.nodes.contains_key(&id)
    }

    fn node_count(&self) -> u64 {
        self.nodes.len() as u64
    }

    fn create_edge(
        &mut self,
        source: StepId,
        target: StepId,
        edge_type: EdgeType,
        props: Vec<(String, PropValue)>,
    ) -> Result<EdgeId> {
        if !self.nodes.contains_key(&source) {
            return Err(Error::Lookup(source));
        }
        if !self.nodes.contains_key(&target) {
            return Err(Error::Lookup(target));
        }
        let id = EdgeId(self.next_edge);
        let record = LogRecord::CreateEdge {
            id,
            source,
            target,
            edge_type,
            props,
        };
        self.log(&record)?;
        self.apply(record)?;
        Ok(id)
    }

    fn delete_edge(&mut self, edge: EdgeId) -> Result<()> {
        if !self.edges.contains_key(&edge) {
            return Err(Error::Storage(format!("unknown edge {edge}")));
        }
        let record = LogRecord::DeleteEdge { id: edge };
        self.log(&record)?;
        self.apply(record)
    }

    fn node_prop(&self, id: StepId, key: &str) -> Result<Option<PropValue>> {
        Ok(self.node(id)?.props.get(key).cloned())
    }

    fn set_node_prop(&mut self, id: StepId, key: &str, value: PropValue) -> Result<()> {
        self.node(id)?;
        let record = LogRecord::SetNodeProp {
            id,
            key: key.to_string(),
            value,
        };
        self.log(&record)?;
        self.apply(record)
    }

    fn remove_node_prop(&mut self, id: StepId, key: &str) -> Result<Option<PropValue>> {
        let previous = self.node(id)?.props.get(key).cloned();
        if previous.is_some() {
            let record = LogRecord::RemoveNodeProp {
                id,
                key: key.to_string(),
            };
            self.log(&record)?;
            self.apply(record)?;
        }
        Ok(previous)
    }

    fn node_prop_keys(&self, id: StepId) -> Result<Vec<String>> {
        Ok(self
            .node(id)?
            .props
            .keys()
            .filter(|k| !keys::is_reserved(k))
            .cloned()
            .collect())
    }

    fn edge_prop(&self, edge: EdgeId, key: &str) -> Result<Option<PropValue>> {
        Ok(self.edge(edge)?.props.get(key).cloned())
    }

    fn set_edge_prop(&mut self, edge: EdgeId, key: &str, value: PropValue) -> Result<()> {
        self.edge(edge)?;
        let record = LogRecord::SetEdgeProp {
            id: edge,
            key: key.to_string(),
            value,
        };
        self.log(&record)?;
        self.apply(record)
    }

    fn remove_edge_prop(&mut self, edge: EdgeId, key: &str) -> Result<Option<PropValue>> {
        let previous = self.edge(edge)?.props.get(key).cloned();
        if previous.is_some() {
            let record = LogRecord::RemoveEdgeProp {
                id: edge,
                key: key.to_string(),
            };
            self.log(&record)?;
            self.apply(record)?;
        }
        Ok(previous)
    }

    fn edge_prop_keys(&self, edge: EdgeId) -> Result<Vec<String>> {
        Ok(self
            .edge(edge)?
            .props
            .keys()
            .filter(|k| !keys::is_reserved(k))
            .cloned()
            .collect())
    }

    fn edge_endpoints(&self, edge: EdgeId) -> Result<(StepId, StepId)> {
        let e = self.edge(edge)?;
        Ok((e.source, e.target))
    }

    fn edge_type(&self, edge: EdgeId) -> Result<EdgeType> {
        Ok(self.edge(edge)?.edge_type)
    }

    fn degree(&self, id: StepId, dir: Dir, types: &[EdgeType]) -> Result<usize> {
        let mut count = 0;
        for edge in self.adjacency(id, dir)? {
            if types.contains(&self.edge(*edge)?.edge_type) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn edges(&self, id: StepId, dir: Dir, types: &[EdgeType]) -> Result<Vec<EdgeId>> {
        let mut matching = Vec::new();
        for edge in self.adjacency(id, dir)? {
            if types.contains(&self.edge(*edge)?.edge_type) {
                matching.push(*edge);
            }
        }
        Ok(matching)
    }

    fn single_edge(&self, id: StepId, dir: Dir, edge_type: EdgeType) -> Result<Option<EdgeId>> {
        let matching = self.edges(id, dir, &[edge_type])?;
        match matching.len() {
            0 => Ok(None),
            1 => Ok(Some(matching[0])),
            n => Err(Error::Storage(format!(
                "node {id} has {n} {edge_type:?} edges ({dir:?}), expected at most one"
            ))),
        }
    }

    fn commit(&mut self) -> Result<()> {
        if let Some(w) = self.writer.as_mut() {
            w.sync()?;
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(mut w) = self.writer.take() {
            w.sync()?;
            debug!(dir = %self.dir.display(), "graph store shut down");
        }
        Ok(())
    }
}
