//! Attribute codec.
//!
//! Maps between [`AttrValue`] (the caller-facing tagged union) and
//! [`PropValue`] (what the storage layer persists). Booleans, integers and
//! floats pass through as native primitives; every other variant is
//! serialized with bincode into a tagged blob and decoded back by its serde
//! tag.
//!
//! Round-trip law: `decode(&encode(&v)?)? == v` for every supported shape.
//!
//! A single attribute failing to encode or decode is a per-record problem:
//! the bulk helpers log it and skip that attribute instead of aborting the
//! surrounding operation.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{Error, Result};
use crate::value::{AttrValue, PropValue};

/// Encode one attribute value into its storage representation.
pub fn encode(value: &AttrValue) -> Result<PropValue> {
    match value {
        AttrValue::Bool(b) => Ok(PropValue::Bool(*b)),
        AttrValue::Int(i) => Ok(PropValue::Int(*i)),
        AttrValue::Float(f) => Ok(PropValue::Float(*f)),
        other => {
            let bytes = bincode::serialize(other)
                .map_err(|e| Error::Serialization(format!("{} attribute: {e}", other.type_name())))?;
            Ok(PropValue::Blob(bytes))
        }
    }
}

/// Decode one stored property back into an attribute value.
pub fn decode(value: &PropValue) -> Result<AttrValue> {
    match value {
        PropValue::Bool(b) => Ok(AttrValue::Bool(*b)),
        PropValue::Int(i) => Ok(AttrValue::Int(*i)),
        PropValue::Float(f) => Ok(AttrValue::Float(*f)),
        // Structural text properties read through the exact-key path.
        PropValue::Text(s) => Ok(AttrValue::String(s.clone())),
        PropValue::Blob(bytes) => bincode::deserialize(bytes)
            .map_err(|e| Error::Serialization(format!("attribute blob: {e}"))),
    }
}

/// Encode a user-attribute map, skipping (and logging) entries that fail.
pub fn encode_attributes(attrs: &HashMap<String, AttrValue>) -> Vec<(String, PropValue)> {
    let mut encoded = Vec::with_capacity(attrs.len());
    for (name, value) in attrs {
        match encode(value) {
            Ok(prop) => encoded.push((name.clone(), prop)),
            Err(e) => warn!(attribute = %name, error = %e, "attribute cannot be serialized, skipped"),
        }
    }
    encoded
}

/// Decode a stored property map, skipping (and logging) entries that fail.
pub fn decode_attributes(props: Vec<(String, PropValue)>) -> HashMap<String, AttrValue> {
    let mut decoded = HashMap::with_capacity(props.len());
    for (name, prop) in props {
        match decode(&prop) {
            Ok(value) => {
                decoded.insert(name, value);
            }
            Err(e) => warn!(attribute = %name, error = %e, "attribute cannot be deserialized, skipped"),
        }
    }
    decoded
}
