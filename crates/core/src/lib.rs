//! Core types for the tracegraph store.
//!
//! This crate defines the fundamental vocabulary shared by every layer:
//! - [`types`]: step/edge identifiers, dependency kinds and directions,
//!   property-key constants
//! - [`value`]: the attribute value model ([`AttrValue`]) and its storage
//!   primitive representation ([`PropValue`])
//! - [`codec`]: the attribute codec mapping between the two
//! - [`error`]: the unified error taxonomy

pub mod codec;
pub mod error;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use types::{DependencyKind, Direction, EdgeId, StepId};
pub use value::{AttrValue, PropValue};
