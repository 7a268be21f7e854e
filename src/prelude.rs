//! Convenient imports for tracegraphdb.
//!
//! This module re-exports the most commonly used types so you can get
//! started with a single import:
//!
//! ```no_run
//! use tracegraphdb::prelude::*;
//! ```

// Lifecycle entry points
pub use crate::{Trace, TraceBuilder, TraceConfig, TraceLoader, TraceSource};

// Error handling
pub use crate::{Error, Result};

// The trace model
pub use crate::{
    AttrValue, Dependency, DependencyKind, Direction, Endpoint, Order, Step, StepData, StepId,
};
