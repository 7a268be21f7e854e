//! tracegraphdb: a persistent graph store for dataflow execution traces.
//!
//! An execution trace is a directed graph: every fired action of the traced
//! program is a [`Step`], and every reason one step had to run before
//! another is a typed [`Dependency`] between them. This crate persists such
//! graphs on disk and serves them back with bounded memory, so traces with
//! hundreds of millions of steps can be built, sorted and queried on an
//! ordinary workstation.
//!
//! # Lifecycle
//!
//! A trace database is built once, from an external trace file, through
//! [`TraceBuilder`]; after [`build`](TraceBuilder::build) the graph topology
//! is frozen. The resulting [`Trace`] supports queries, user-attribute
//! mutation, topological sorting and scheduler-edge maintenance. The
//! [`TraceLoader`] ties the two together: it reopens an existing database
//! when one is present and falls back to a full rebuild through a
//! [`TraceSource`] when it is missing or unreadable.
//!
//! ```no_run
//! use tracegraphdb::{Order, TraceConfig, TraceLoader};
//! # use tracegraphdb::{Result, TraceBuilder, TraceSource};
//! # struct XmlReader;
//! # impl TraceSource for XmlReader {
//! #     fn read_into(&mut self, _: &mut TraceBuilder) -> Result<()> { Ok(()) }
//! # }
//!
//! # fn main() -> tracegraphdb::Result<()> {
//! let mut source = XmlReader;
//! let trace = TraceLoader::load(
//!     std::path::Path::new("app.tracex"),
//!     &TraceConfig::default(),
//!     &mut source,
//! )?;
//!
//! for step in trace.steps(Order::IncreasingTo)? {
//!     println!("{} fires {}", step.actor(), step.action());
//! }
//! trace.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Crates
//!
//! The workspace is layered: `tracegraph-core` holds the value model, codec
//! and error taxonomy; `tracegraph-storage` the graph storage capability and
//! its log-backed implementation; `tracegraph-engine` the builder, reader,
//! iterators and sorter. This facade re-exports the public surface.

#![warn(missing_docs)]

pub mod loader;
pub mod prelude;

pub use loader::{TraceLoader, TraceSource};

pub use tracegraph_core::types::{keys, DependencyKind, Direction, EdgeId, StepId};
pub use tracegraph_core::value::{AttrValue, PropValue};
pub use tracegraph_core::{Error, Result};

pub use tracegraph_engine::{
    db_dir_for, Dependency, Endpoint, Order, Step, StepData, StepIter, Trace, TraceBuilder,
    TraceConfig, TraceMetadata, DB_DIR_NAME, PROPERTIES_FILE,
};
