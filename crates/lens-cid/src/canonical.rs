//! Canonical JSON form used as hashing input.

use serde_json::{Map, Value};

use crate::error::CidError;

/// Maximum number of nested arrays and objects accepted by [`canonicalize`].
///
/// One below serde_json's parser recursion limit, so every accepted value
/// parses back from its JSON text.
pub const MAX_DEPTH: usize = 127;

/// Return a copy of `value` with the keys of every nested object sorted
/// byte-wise ascending. Array order and scalars are preserved.
///
/// Values with more than [`MAX_DEPTH`] levels of nesting are rejected.
pub fn canonicalize(value: &Value) -> Result<Value, CidError> {
    canonicalize_at(value, 0)
}

/// `depth` counts the containers enclosing `value`.
fn canonicalize_at(value: &Value, depth: usize) -> Result<Value, CidError> {
    if matches!(value, Value::Object(_) | Value::Array(_)) && depth >= MAX_DEPTH {
        return Err(CidError::Encoding(format!(
            "value nests deeper than {MAX_DEPTH} levels"
        )));
    }
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize_at(&map[key.as_str()], depth + 1)?);
            }
            Ok(Value::Object(sorted))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| canonicalize_at(item, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        scalar => Ok(scalar.clone()),
    }
}

/// Compact JSON bytes of the canonical form.
pub(crate) fn canonical_bytes(value: &Value) -> Result<Vec<u8>, CidError> {
    let canonical = canonicalize(value)?;
    serde_json::to_vec(&canonical).map_err(|e| CidError::Encoding(e.to_string()))
}
