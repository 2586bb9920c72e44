//! Conversions between backend `Value`s and plain JSON.
//!
//! Stack documents and command-issue requests carry argument values as plain
//! JSON (strings, booleans, objects, arrays); templates and the live feed
//! carry typed `Value`s.

use mdb_types::{AggregateValue, Value};
use serde_json::Value as JsonValue;

/// Untyped JSON to backend value.
///
/// Arrays become `Array`, objects become `Aggregate`, booleans stay booleans
/// and everything else is carried as its string form.
pub fn value_from_json(json: &JsonValue) -> Value {
    match json {
        JsonValue::Array(items) => Value::Array(items.iter().map(value_from_json).collect()),
        JsonValue::Object(map) => {
            let mut aggregate = AggregateValue::default();
            for (name, item) in map {
                aggregate.push(name.clone(), value_from_json(item));
            }
            Value::Aggregate(aggregate)
        }
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Number(n) => Value::String(n.to_string()),
        JsonValue::Null => Value::String(String::new()),
    }
}

/// Backend value to plain JSON.
///
/// Binary values become lowercase hex strings, the same form the input
/// widgets edit.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Float(v) => serde_json::Number::from_f64(f64::from(*v))
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Double(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Uint32(v) => JsonValue::from(*v),
        Value::Sint32(v) => JsonValue::from(*v),
        Value::Uint64(v) => JsonValue::from(*v),
        Value::Sint64(v) => JsonValue::from(*v),
        Value::Boolean(v) => JsonValue::Bool(*v),
        Value::Binary(bytes) => JsonValue::String(hex::encode(bytes)),
        Value::String(s) | Value::Enumerated(s) | Value::Timestamp(s) => {
            JsonValue::String(s.clone())
        }
        Value::Aggregate(aggregate) => {
            let mut map = serde_json::Map::new();
            for (name, member) in aggregate.iter() {
                map.insert(name.to_string(), value_to_json(member));
            }
            JsonValue::Object(map)
        }
        Value::Array(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
    }
}

/// Numeric view of a value; `None` for anything that is not a number
pub fn value_to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Float(v) => Some(f64::from(*v)),
        Value::Double(v) => Some(*v),
        Value::Uint32(v) => Some(f64::from(*v)),
        Value::Sint32(v) => Some(f64::from(*v)),
        Value::Uint64(v) => Some(*v as f64),
        Value::Sint64(v) => Some(*v as f64),
        _ => None,
    }
}
