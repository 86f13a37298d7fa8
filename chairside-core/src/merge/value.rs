// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Structural JSON Value Helpers
//!
//! Deep equality and object-merge primitives the merge engine builds on.
//! Arrays compare as ordered sequences, objects as unordered key sets,
//! and `null` is distinct from an absent key.

use serde_json::{Map, Value};

/// Recursive structural equality over JSON values.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| deep_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, va)| y.get(k).is_some_and(|vb| deep_equal(va, vb)))
        }
        _ => false,
    }
}

/// Returns true for plain objects: not arrays, not null, not scalars.
pub fn is_plain_object(value: &Value) -> bool {
    value.is_object()
}

/// Shallow-merges `remote` over `local`, both plain objects.
///
/// Remote keys overlay local keys; keys only present locally survive.
pub fn shallow_merge(local: &Map<String, Value>, remote: &Map<String, Value>) -> Value {
    let mut merged = local.clone();
    for (k, v) in remote {
        merged.insert(k.clone(), v.clone());
    }
    Value::Object(merged)
}
