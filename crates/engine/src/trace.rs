//! The opened trace and its shared inner state.
//!
//! [`Trace`] is a cheaply cloneable handle over [`TraceInner`]: the storage
//! backend, the metadata, the transaction coalescer and two LRU view caches.
//! Step and dependency views hold an `Arc` of the inner state, so a view
//! outliving its `Trace` handle keeps the database open until the last view
//! is dropped. Cached view states never point back at views, which keeps the
//! `Arc` graph acyclic.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use tracegraph_core::types::keys;
use tracegraph_core::value::{AttrValue, PropValue};
use tracegraph_core::{EdgeId, Error, Result, StepId};
use tracegraph_storage::{Dir, EdgeType, GraphStorage, PagedGraph, TransactionCoalescer};

use crate::config::TraceConfig;
use crate::dependency::{DepState, Dependency};
use crate::iter::{Filter, Order, StepIter};
use crate::metadata::{TraceMetadata, PROPERTIES_FILE};
use crate::sort;
use crate::step::{Step, StepState};

/// Name of the graph database directory, created next to the trace file.
pub const DB_DIR_NAME: &str = "tracedb";

/// Database directory for a given trace file.
pub fn db_dir_for(trace_file: &Path) -> PathBuf {
    match trace_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.join(DB_DIR_NAME),
        None => PathBuf::from(DB_DIR_NAME),
    }
}

fn cache_capacity(requested: usize) -> NonZeroUsize {
    NonZeroUsize::new(requested).unwrap_or(NonZeroUsize::MIN)
}

/// Shared state behind a [`Trace`] and all of its views.
pub(crate) struct TraceInner {
    trace_file: PathBuf,
    db_dir: PathBuf,
    storage: Mutex<Box<dyn GraphStorage>>,
    pub(crate) meta: Mutex<TraceMetadata>,
    coalescer: Mutex<TransactionCoalescer>,
    step_views: Mutex<LruCache<StepId, Arc<StepState>>>,
    dep_views: Mutex<LruCache<EdgeId, Arc<DepState>>>,
    closed: AtomicBool,
}

impl TraceInner {
    /// Run a read-only closure against the storage backend.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&dyn GraphStorage) -> T) -> T {
        let storage = self.storage.lock();
        f(&**storage)
    }

    /// Run one mutating closure against the storage backend and record it
    /// with the coalescer.
    pub(crate) fn mutate<T>(
        &self,
        f: impl FnOnce(&mut dyn GraphStorage) -> Result<T>,
    ) -> Result<T> {
        let mut storage = self.storage.lock();
        let value = f(&mut **storage)?;
        self.coalescer.lock().record(&mut **storage)?;
        Ok(value)
    }

    /// Run a closure holding both the storage and coalescer locks for the
    /// whole duration. Used by the sorter for its long mutation streams.
    pub(crate) fn bulk_mutate<T>(
        &self,
        f: impl FnOnce(&mut dyn GraphStorage, &mut TransactionCoalescer) -> Result<T>,
    ) -> Result<T> {
        let mut storage = self.storage.lock();
        let mut coalescer = self.coalescer.lock();
        f(&mut **storage, &mut coalescer)
    }

    /// Cached state for a step, or `None` (logged) if the id has no node.
    pub(crate) fn step_state(&self, id: StepId) -> Option<Arc<StepState>> {
        if let Some(state) = self.step_views.lock().get(&id) {
            return Some(state.clone());
        }
        if !self.read(|s| s.node_exists(id)) {
            error!(step = id, "step is not registered in this trace");
            return None;
        }
        let state = Arc::new(StepState::new(id));
        self.step_views.lock().put(id, state.clone());
        Some(state)
    }

    /// Cached state for a dependency edge.
    pub(crate) fn dep_state(&self, edge: EdgeId) -> Arc<DepState> {
        let mut cache = self.dep_views.lock();
        if let Some(state) = cache.get(&edge) {
            return state.clone();
        }
        let state = Arc::new(DepState::new(edge));
        cache.put(edge, state.clone());
        state
    }

    /// Build a step view. `self` must be the `Arc` the views share.
    pub(crate) fn step_view(self: &Arc<Self>, id: StepId) -> Option<Step> {
        let state = self.step_state(id)?;
        Some(Step::new(self.clone(), state))
    }

    /// Build a dependency view.
    pub(crate) fn dep_view(self: &Arc<Self>, edge: EdgeId) -> Dependency {
        let state = self.dep_state(edge);
        Dependency::new(self.clone(), state)
    }

    /// Drop all cached view states. Required after structural changes
    /// (scheduler-edge maintenance) because step states memoize their
    /// dependency lists.
    pub(crate) fn invalidate_views(&self) {
        self.step_views.lock().clear();
        self.dep_views.lock().clear();
    }

    /// Exact-key text property of a node.
    pub(crate) fn node_text(&self, id: StepId, key: &str) -> Option<String> {
        match self.read(|s| s.node_prop(id, key)) {
            Ok(Some(PropValue::Text(s))) => Some(s),
            Ok(_) => None,
            Err(e) => {
                error!(step = id, key, error = %e, "node property read failed");
                None
            }
        }
    }

    /// Exact-key text property of an edge.
    pub(crate) fn edge_text(&self, edge: EdgeId, key: &str) -> Option<String> {
        match self.read(|s| s.edge_prop(edge, key)) {
            Ok(Some(PropValue::Text(s))) => Some(s),
            Ok(_) => None,
            Err(e) => {
                error!(edge = %edge, key, error = %e, "edge property read failed");
                None
            }
        }
    }

    /// Exact-key integer property of an edge.
    pub(crate) fn edge_int(&self, edge: EdgeId, key: &str) -> Option<i64> {
        match self.read(|s| s.edge_prop(edge, key)) {
            Ok(Some(PropValue::Int(i))) => Some(i),
            Ok(_) => None,
            Err(e) => {
                error!(edge = %edge, key, error = %e, "edge property read failed");
                None
            }
        }
    }

    fn close_inner(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return true;
        }
        let result = (|| -> Result<()> {
            let mut storage = self.storage.lock();
            self.coalescer.lock().flush(&mut **storage)?;
            storage.shutdown()?;
            self.meta.lock().store(&self.db_dir.join(PROPERTIES_FILE))?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                // latch only on success, so a failed close stays retryable
                self.closed.store(true, Ordering::SeqCst);
                info!(trace = %self.trace_file.display(), "trace closed");
                true
            }
            Err(e) => {
                error!(trace = %self.trace_file.display(), error = %e, "trace close failed");
                false
            }
        }
    }
}

impl Drop for TraceInner {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            debug!(trace = %self.trace_file.display(), "closing trace on drop");
            self.close_inner();
        }
    }
}

/// A loaded execution trace.
///
/// Handles are cheap to clone and share one database. All accessors degrade
/// per record (log and return an empty/absent value) rather than panicking;
/// structural failures surface as [`Error`] from the fallible operations.
#[derive(Clone)]
pub struct Trace {
    inner: Arc<TraceInner>,
}

impl std::fmt::Debug for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trace")
            .field("trace_file", &self.inner.trace_file)
            .finish_non_exhaustive()
    }
}

impl Trace {
    /// Open an existing trace database built for `trace_file`.
    ///
    /// Fails if the database directory or metadata file is missing, or if
    /// the two disagree on the step count. Callers that can rebuild from the
    /// original trace file should treat any error here as "rebuild".
    pub fn open(trace_file: &Path, config: &TraceConfig) -> Result<Trace> {
        let db_dir = db_dir_for(trace_file);
        let storage = PagedGraph::open(&db_dir)?;
        let meta = TraceMetadata::load(&db_dir.join(PROPERTIES_FILE))?;

        if meta.step_count() != storage.node_count() {
            return Err(Error::Storage(format!(
                "metadata lists {} steps but the graph holds {} nodes",
                meta.step_count(),
                storage.node_count()
            )));
        }

        info!(
            trace = %trace_file.display(),
            steps = meta.step_count(),
            dependencies = meta.dependency_count(),
            sorted = meta.is_sorted(),
            "trace opened"
        );

        Ok(Trace {
            inner: Arc::new(TraceInner {
                trace_file: trace_file.to_path_buf(),
                db_dir,
                storage: Mutex::new(Box::new(storage)),
                meta: Mutex::new(meta),
                coalescer: Mutex::new(TransactionCoalescer::new(
                    config.max_uncommitted,
                    config.log_every,
                )),
                step_views: Mutex::new(LruCache::new(cache_capacity(config.step_cache_capacity))),
                dep_views: Mutex::new(LruCache::new(cache_capacity(
                    config.dependency_cache_capacity,
                ))),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// The trace file this database was built from.
    pub fn file(&self) -> &Path {
        &self.inner.trace_file
    }

    /// The database directory.
    pub fn db_dir(&self) -> &Path {
        &self.inner.db_dir
    }

    /// Total number of steps.
    pub fn step_count(&self) -> u64 {
        self.inner.meta.lock().step_count()
    }

    /// Total number of dependencies.
    pub fn dependency_count(&self) -> u64 {
        self.inner.meta.lock().dependency_count()
    }

    /// Number of steps fired by `actor`.
    pub fn steps_of_actor(&self, actor: &str) -> u64 {
        self.inner.meta.lock().steps_of_actor(actor)
    }

    /// Number of steps firing `action` of `actor`.
    pub fn steps_of_action(&self, actor: &str, action: &str) -> u64 {
        self.inner.meta.lock().steps_of_action(actor, action)
    }

    /// Whether a materialized topological order exists.
    pub fn is_sorted(&self) -> bool {
        self.inner.meta.lock().is_sorted()
    }

    /// A single step by id, or `None` (logged) if unknown.
    pub fn step(&self, id: StepId) -> Option<Step> {
        self.inner.step_view(id)
    }

    /// Iterate all steps in the given order.
    ///
    /// Topological orders sort the trace first if no order has been
    /// materialized yet.
    pub fn steps(&self, order: Order) -> Result<StepIter> {
        self.iter(order, None)
    }

    /// Iterate the steps of one actor.
    pub fn steps_by_actor(&self, order: Order, actor: &str) -> Result<StepIter> {
        self.iter(order, Some(Filter::actor(actor)))
    }

    /// Iterate the steps of one action of one actor.
    pub fn steps_by_action(&self, order: Order, actor: &str, action: &str) -> Result<StepIter> {
        self.iter(order, Some(Filter::action(actor, action)))
    }

    fn iter(&self, order: Order, filter: Option<Filter>) -> Result<StepIter> {
        if order.is_topological() && !self.is_sorted() {
            self.sort()?;
        }
        Ok(StepIter::new(self.inner.clone(), order, filter))
    }

    /// Materialize the topological order.
    ///
    /// No-op if already sorted. On success the metadata (sorted flag, chain
    /// endpoints) is persisted immediately.
    pub fn sort(&self) -> Result<()> {
        if self.is_sorted() {
            debug!("trace is already sorted");
            return Ok(());
        }
        if self.step_count() == 0 {
            debug!("empty trace, nothing to sort");
            return Ok(());
        }
        sort::run(&self.inner)?;
        self.inner
            .meta
            .lock()
            .store(&self.inner.db_dir.join(PROPERTIES_FILE))?;
        Ok(())
    }

    /// Get a trace-level attribute.
    pub fn attribute(&self, name: &str) -> Option<AttrValue> {
        self.inner.meta.lock().attribute(name).cloned()
    }

    /// Set a trace-level attribute. Persisted with the metadata on close.
    pub fn set_attribute(&self, name: &str, value: AttrValue) {
        self.inner.meta.lock().set_attribute(name, value);
    }

    /// All trace-level attributes.
    pub fn attributes(&self) -> std::collections::BTreeMap<String, AttrValue> {
        self.inner.meta.lock().attributes().clone()
    }

    /// Add a scheduler dependency between two registered steps.
    ///
    /// Scheduler edges carry the same endpoint properties as built-in
    /// dependencies and participate in ordering like any other kind.
    pub fn add_scheduler_dependency(&self, source: StepId, target: StepId) -> Result<Dependency> {
        for id in [source, target] {
            if !self.inner.read(|s| s.node_exists(id)) {
                return Err(Error::Lookup(id));
            }
        }
        let props = vec![
            (keys::DEP_SOURCE_ID.to_string(), PropValue::Int(source as i64)),
            (keys::DEP_TARGET_ID.to_string(), PropValue::Int(target as i64)),
            (
                keys::DEP_SOURCE_ACTOR.to_string(),
                text_prop(self.inner.node_text(source, keys::STEP_ACTOR)),
            ),
            (
                keys::DEP_SOURCE_ACTION.to_string(),
                text_prop(self.inner.node_text(source, keys::STEP_ACTION)),
            ),
            (
                keys::DEP_TARGET_ACTOR.to_string(),
                text_prop(self.inner.node_text(target, keys::STEP_ACTOR)),
            ),
            (
                keys::DEP_TARGET_ACTION.to_string(),
                text_prop(self.inner.node_text(target, keys::STEP_ACTION)),
            ),
        ];
        let edge = self
            .inner
            .mutate(|s| s.create_edge(source, target, EdgeType::Scheduler, props))?;
        self.inner.meta.lock().add_dependency();
        self.inner.invalidate_views();
        debug!(source, target, edge = %edge, "scheduler dependency added");
        Ok(self.inner.dep_view(edge))
    }

    /// Delete every scheduler dependency, returning how many were removed.
    pub fn remove_scheduler_dependencies(&self) -> Result<u64> {
        let steps = self.step_count();
        let mut removed = 0u64;
        for id in 0..steps {
            let edges = self
                .inner
                .read(|s| s.edges(id, Dir::Outgoing, &[EdgeType::Scheduler]))?;
            for edge in edges {
                self.inner.mutate(|s| s.delete_edge(edge))?;
                self.inner.meta.lock().remove_dependency();
                removed += 1;
            }
        }
        if removed > 0 {
            self.inner.invalidate_views();
        }
        info!(removed, "scheduler dependencies removed");
        Ok(removed)
    }

    /// Flush, shut the storage down and persist the metadata.
    ///
    /// Returns `false` if any part of the shutdown failed (logged); the
    /// trace stays open in that case and `close` may be called again.
    /// Once it has succeeded, further calls are no-ops returning `true`.
    /// Dropping the last handle without a successful `close` performs the
    /// same shutdown on a best-effort basis.
    pub fn close(&self) -> bool {
        self.inner.close_inner()
    }
}

fn text_prop(value: Option<String>) -> PropValue {
    PropValue::Text(value.unwrap_or_default())
}
