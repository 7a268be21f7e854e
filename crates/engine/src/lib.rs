//! Trace engine: construction, reading, iteration and sorting.
//!
//! This crate turns the storage layer's raw graph into the trace model:
//! [`TraceBuilder`] for bulk write-once ingestion, [`Trace`] with its
//! [`Step`] and [`Dependency`] views for querying, [`StepIter`] for the four
//! iteration orders, and the chain-materializing topological sorter behind
//! [`Trace::sort`].

#![warn(missing_docs)]

pub mod builder;
pub mod config;
pub mod dependency;
pub mod iter;
pub mod metadata;
mod sort;
pub mod step;
pub mod trace;

pub use builder::{Endpoint, StepData, TraceBuilder};
pub use config::TraceConfig;
pub use dependency::Dependency;
pub use iter::{Order, StepIter};
pub use metadata::{TraceMetadata, PROPERTIES_FILE};
pub use step::Step;
pub use trace::{db_dir_for, Trace, DB_DIR_NAME};
