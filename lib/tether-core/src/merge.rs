//! Deep extend of JSON values.
//!
//! Overrides are deep-copied into the destination. A container only merges
//! into a container of the same kind: objects merge key by key, arrays merge
//! index by index. Any other combination re-initializes the destination
//! field with a copy of the override.

use serde_json::{Map, Value};

/// Extend `dst` with every field of `src`.
pub fn extend(dst: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (key, value) in src {
        match dst.get_mut(key) {
            Some(existing) => extend_value(existing, value),
            None => {
                dst.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Extend a single value in place.
pub fn extend_value(dst: &mut Value, src: &Value) {
    match (dst, src) {
        (Value::Object(dst), Value::Object(src)) => extend(dst, src),
        (Value::Array(dst), Value::Array(src)) => {
            for (index, value) in src.iter().enumerate() {
                match dst.get_mut(index) {
                    Some(existing) => extend_value(existing, value),
                    None => dst.push(value.clone()),
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}
