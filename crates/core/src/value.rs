//! Attribute value model.
//!
//! Two representations exist side by side:
//!
//! - [`AttrValue`] is what callers see: an explicit tagged union covering
//!   every attribute shape the trace model supports. There is no reflection
//!   and no unchecked downcast; an attribute is exactly one of these
//!   variants.
//! - [`PropValue`] is what the storage layer holds: booleans, integers and
//!   floats as native primitives, strings as text, and everything else as an
//!   opaque blob produced by the codec.
//!
//! Equality on both types is strict: different variants are never equal and
//! floats use IEEE-754 semantics (`NaN != NaN`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An attribute value attached to a step, a dependency or the trace itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Boolean flag
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit IEEE-754 floating point
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list of strings (variable name lists)
    StringList(Vec<String>),
    /// String-keyed integer map (port token counts); BTreeMap keeps the
    /// encoded form stable across runs
    StringIntMap(BTreeMap<String, i64>),
    /// Caller-supplied opaque payload with an application type tag
    Blob {
        /// Application-defined type tag
        tag: String,
        /// Raw payload bytes
        bytes: Vec<u8>,
    },
}

impl AttrValue {
    /// Variant name, for logs and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "Bool",
            AttrValue::Int(_) => "Int",
            AttrValue::Float(_) => "Float",
            AttrValue::String(_) => "String",
            AttrValue::StringList(_) => "StringList",
            AttrValue::StringIntMap(_) => "StringIntMap",
            AttrValue::Blob { .. } => "Blob",
        }
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as string list.
    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            AttrValue::StringList(l) => Some(l),
            _ => None,
        }
    }

    /// Try to get as string -> integer map.
    pub fn as_string_int_map(&self) -> Option<&BTreeMap<String, i64>> {
        match self {
            AttrValue::StringIntMap(m) => Some(m),
            _ => None,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::String(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::String(v)
    }
}

/// Storage-primitive representation of a property value.
///
/// This is the only value shape [`GraphStorage`] knows about. Primitives pass
/// through the codec untouched; structured values arrive as [`PropValue::Blob`].
///
/// [`GraphStorage`]: https://docs.rs/tracegraph-storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropValue {
    /// Boolean primitive
    Bool(bool),
    /// Integer primitive
    Int(i64),
    /// Float primitive
    Float(f64),
    /// Plain text (structural names: actors, actions, ports, guards)
    Text(String),
    /// Codec-produced blob holding an encoded [`AttrValue`]
    Blob(Vec<u8>),
}

impl PropValue {
    /// Variant name, for logs and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropValue::Bool(_) => "Bool",
            PropValue::Int(_) => "Int",
            PropValue::Float(_) => "Float",
            PropValue::Text(_) => "Text",
            PropValue::Blob(_) => "Blob",
        }
    }

    /// Try to get as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}
