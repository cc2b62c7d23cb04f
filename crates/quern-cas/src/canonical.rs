//! Deterministic JSON encoding
//!
//! Every hash in the engine (cache paths, configuration digests, stored
//! payloads) is computed over canonical JSON bytes: object keys sorted
//! recursively, no insignificant whitespace, timestamps rendered as ISO-8601
//! strings by their producers. Two values that compare equal always encode
//! to identical bytes.
//!
//! Serializing a struct directly would emit fields in declaration order, so
//! encoding always goes through a [`serde_json::Value`] first; `Value`
//! objects are backed by a sorted map and serialize with sorted keys.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Return a structurally identical value whose object keys are sorted at
/// every level.
///
/// With default `serde_json` features object maps are already sorted; this
/// exists so the canonical form does not silently depend on a feature flag.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (key, inner) in entries {
                out.insert(key.clone(), canonicalize(inner));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Encode any serializable value to canonical JSON bytes.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&canonicalize(&value))?)
}

/// Encode any serializable value to a canonical JSON string.
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&canonicalize(&value))?)
}
