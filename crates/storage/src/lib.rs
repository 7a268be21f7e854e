//! Storage layer for tracegraph.
//!
//! - [`graph`]: the [`GraphStorage`] capability trait the engine consumes,
//!   plus the storage-side edge-type vocabulary
//! - [`log`]: the append-only record log providing durability
//! - [`paged`]: [`PagedGraph`], the disk-backed trait implementation
//! - [`coalescer`]: [`TransactionCoalescer`], bounding in-flight uncommitted
//!   mutations

pub mod coalescer;
pub mod graph;
pub mod log;
pub mod paged;

pub use coalescer::TransactionCoalescer;
pub use graph::{Dir, EdgeType, GraphStorage};
pub use paged::PagedGraph;
