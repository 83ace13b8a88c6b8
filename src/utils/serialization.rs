// src/utils/serialization.rs
//! Serialization utilities for the DID system.
//!
//! Provides the canonical JSON form that credential and presentation proofs are
//! computed over.

use serde::Serialize;
use serde_json::Value;

/// Canonical JSON form of a value: object keys sorted lexicographically at every
/// depth, no insignificant whitespace.
///
/// Signers and verifiers both call this on the unsigned object, so they always
/// hash the identical byte string.
///
/// # Returns
/// - `Ok(String)` with the canonical form
/// - `Err(serde_json::Error)` if the value cannot be represented as JSON
pub fn canonical_json<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(data)?;
    serde_json::to_string(&sort_keys(value))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"z": true, "c": [ {"y": 1, "x": 2} ]}});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":{"c":[{"x":2,"y":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_json_independent_of_insertion_order() {
        let first = json!({"issuer": "did:mdip:btc-a", "subject": "did:mdip:btc-b"});
        let second = json!({"subject": "did:mdip:btc-b", "issuer": "did:mdip:btc-a"});
        assert_eq!(canonical_json(&first).unwrap(), canonical_json(&second).unwrap());
    }
}
