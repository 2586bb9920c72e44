//! Value codec
//!
//! Converts between the backend's typed values and the editable form
//! representation used by argument controls:
//!
//! ```text
//! Value ──► value_to_json ──► render_json ──► FormValue ──► to_assignment ──► issue request
//!   ▲                                            │
//!   └────────────── parse_scalar ◄───────────────┘ (scalars)
//! ```
//!
//! Rendering never fails. Types the codec does not recognise are rendered
//! as plain strings with a logged warning, so command-form construction is
//! never halted by an unexpected backend type.

mod json;
mod validate;

pub use json::{value_from_json, value_to_json, value_to_number};
pub use validate::validate_scalar;

use mdb_types::{AggregateValue, ArgumentType, EngKind, Value};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::ValidationError;

/// Editable representation of an argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    /// Text of a scalar control
    Scalar(String),
    /// Aggregate members by name
    Aggregate(BTreeMap<String, FormValue>),
    /// Array entries in flattened order
    Array(Vec<FormValue>),
}

impl FormValue {
    pub fn empty_scalar() -> Self {
        FormValue::Scalar(String::new())
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            FormValue::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

// ============================================================================
// RENDER
// ============================================================================

/// Stringified form of a backend value.
///
/// Booleans become `"true"`/`"false"`, binary becomes lowercase hex and
/// numbers use their shortest decimal form. Aggregates and arrays render as
/// JSON text.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Boolean(b) => b.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Uint32(v) => v.to_string(),
        Value::Sint32(v) => v.to_string(),
        Value::Uint64(v) => v.to_string(),
        Value::Sint64(v) => v.to_string(),
        Value::Binary(bytes) => hex::encode(bytes),
        Value::String(s) | Value::Enumerated(s) | Value::Timestamp(s) => s.clone(),
        Value::Aggregate(_) | Value::Array(_) => value_to_json(value).to_string(),
    }
}

/// Render a JSON comparison operand to the same string form as `render_value`
pub fn render_json_scalar(json: &JsonValue) -> String {
    match json {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Normalize a boolean literal through the type's true/false literals
fn render_boolean(type_: &ArgumentType, text: &str) -> String {
    if type_.one_string_value.as_deref() == Some(text) {
        "true".to_string()
    } else if type_.zero_string_value.as_deref() == Some(text) {
        "false".to_string()
    } else {
        text.to_string()
    }
}

/// Static initial value of a scalar, as the control shows it.
///
/// Boolean initial values are stored as the type's literal and compared
/// against the true-literal.
pub fn render_initial_scalar(type_: &ArgumentType, initial: &str) -> String {
    if type_.kind() == EngKind::Boolean {
        let truth = type_.one_string_value.as_deref().unwrap_or("true");
        (initial == truth).to_string()
    } else {
        initial.to_string()
    }
}

/// Build the editable form of a value of `type_`.
///
/// `json` is the value supplied by the caller (template or stack entry);
/// `initial` is the declared initial value, used when `json` is absent.
/// Aggregates default to `{}` and arrays to `[]` when neither is present.
pub fn render_form(type_: &ArgumentType, json: Option<&JsonValue>, initial: Option<&str>) -> FormValue {
    match type_.kind() {
        EngKind::Aggregate => {
            let parsed_initial = if json.is_none() {
                initial.and_then(parse_json_initial)
            } else {
                None
            };
            let source = json.or(parsed_initial.as_ref());
            let mut members = BTreeMap::new();
            for member in &type_.member {
                let member_json = source.and_then(|s| s.get(&member.name));
                members.insert(
                    member.name.clone(),
                    render_form(&member.type_, member_json, member.initial_value.as_deref()),
                );
            }
            FormValue::Aggregate(members)
        }
        EngKind::Array(_) => {
            let parsed_initial = if json.is_none() {
                initial.and_then(parse_json_initial)
            } else {
                None
            };
            let entries = match (json.or(parsed_initial.as_ref()), &type_.element_type) {
                (Some(JsonValue::Array(items)), Some(element)) => items
                    .iter()
                    .map(|item| render_form(element, Some(item), None))
                    .collect(),
                (Some(JsonValue::Array(items)), None) => items
                    .iter()
                    .map(|item| FormValue::Scalar(render_json_scalar(item)))
                    .collect(),
                _ => Vec::new(),
            };
            FormValue::Array(entries)
        }
        EngKind::Boolean => match json {
            Some(JsonValue::Bool(b)) => FormValue::Scalar(b.to_string()),
            Some(other) => FormValue::Scalar(render_boolean(type_, &render_json_scalar(other))),
            None => FormValue::Scalar(
                initial
                    .map(|i| render_initial_scalar(type_, i))
                    .unwrap_or_default(),
            ),
        },
        kind => {
            if let EngKind::Unknown(eng_type) = &kind {
                warn!("Unrecognized engType '{}', rendering as string", eng_type);
            }
            match json {
                Some(value) => FormValue::Scalar(render_json_scalar(value)),
                None => FormValue::Scalar(initial.map(str::to_string).unwrap_or_default()),
            }
        }
    }
}

fn parse_json_initial(initial: &str) -> Option<JsonValue> {
    match serde_json::from_str(initial) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!("Initial value '{}' is not valid JSON: {}", initial, e);
            None
        }
    }
}

/// Flatten an aggregate value into `prefix.member` → rendered string pairs
pub fn render_aggregate_fields(prefix: &str, aggregate: &AggregateValue) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    for (name, value) in aggregate.iter() {
        match value {
            Value::Aggregate(nested) => {
                result.extend(render_aggregate_fields(&format!("{prefix}{name}."), nested));
            }
            other => {
                result.insert(format!("{prefix}{name}"), render_value(other));
            }
        }
    }
    result
}

// ============================================================================
// PARSE
// ============================================================================

/// Parse the text of a scalar control into a typed value.
///
/// Integers parse to `Sint64` (or `Uint64` when the type is unsigned),
/// floats to `Double`.
pub fn parse_scalar(type_: &ArgumentType, text: &str) -> Result<Value, ValidationError> {
    match type_.kind() {
        EngKind::Boolean => match text {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            _ => Err(ValidationError::NotABoolean {
                value: text.to_string(),
            }),
        },
        EngKind::Binary => {
            let padded = if text.len() % 2 == 1 {
                format!("0{text}")
            } else {
                text.to_string()
            };
            hex::decode(padded)
                .map(Value::Binary)
                .map_err(|_| ValidationError::InvalidHex {
                    value: text.to_string(),
                })
        }
        EngKind::Integer => {
            let trimmed = text.trim();
            let not_integer = || ValidationError::NotAnInteger {
                value: text.to_string(),
            };
            if type_.signed == Some(false) {
                trimmed.parse::<u64>().map(Value::Uint64).map_err(|_| {
                    if trimmed.starts_with('-') {
                        ValidationError::Unsigned
                    } else {
                        not_integer()
                    }
                })
            } else {
                trimmed.parse::<i64>().map(Value::Sint64).map_err(|_| not_integer())
            }
        }
        EngKind::Float => match text.trim().parse::<f64>() {
            Ok(n) => Ok(Value::Double(n)),
            Err(_) => Err(ValidationError::NotANumber {
                value: text.to_string(),
            }),
        },
        EngKind::Enumeration => {
            if type_.enum_value.is_empty() || type_.enum_value.iter().any(|e| e.label == text) {
                Ok(Value::Enumerated(text.to_string()))
            } else {
                Err(ValidationError::UnknownEnumState {
                    value: text.to_string(),
                })
            }
        }
        EngKind::Time => Ok(Value::Timestamp(text.to_string())),
        EngKind::String => Ok(Value::String(text.to_string())),
        EngKind::Aggregate | EngKind::Array(_) | EngKind::Unknown(_) => {
            warn!(
                "parse_scalar called for non-scalar engType '{}'",
                type_.eng_type
            );
            Ok(Value::String(text.to_string()))
        }
    }
}

/// Serialize a form value into the JSON sent with the command-issue request.
///
/// Booleans are sent as JSON booleans, other scalars as strings (strings
/// carry large numbers without precision loss).
pub fn to_assignment(type_: &ArgumentType, form: &FormValue) -> JsonValue {
    match (type_.kind(), form) {
        (EngKind::Aggregate, FormValue::Aggregate(members)) => {
            let mut map = serde_json::Map::new();
            for member in &type_.member {
                if let Some(value) = members.get(&member.name) {
                    map.insert(member.name.clone(), to_assignment(&member.type_, value));
                }
            }
            JsonValue::Object(map)
        }
        (EngKind::Array(_), FormValue::Array(entries)) => {
            let items = entries
                .iter()
                .map(|entry| match &type_.element_type {
                    Some(element) => to_assignment(element, entry),
                    None => JsonValue::String(entry.as_scalar().unwrap_or_default().to_string()),
                })
                .collect();
            JsonValue::Array(items)
        }
        (EngKind::Boolean, FormValue::Scalar(text)) => JsonValue::Bool(text == "true"),
        (_, FormValue::Scalar(text)) => JsonValue::String(text.clone()),
        (kind, other) => {
            warn!("Form shape does not match engType {:?}", kind);
            form_to_json(other)
        }
    }
}

fn form_to_json(form: &FormValue) -> JsonValue {
    match form {
        FormValue::Scalar(s) => JsonValue::String(s.clone()),
        FormValue::Aggregate(members) => JsonValue::Object(
            members
                .iter()
                .map(|(name, value)| (name.clone(), form_to_json(value)))
                .collect(),
        ),
        FormValue::Array(entries) => JsonValue::Array(entries.iter().map(form_to_json).collect()),
    }
}

// ============================================================================
// INITIALIZATION
// ============================================================================

/// Whether a value of `type_` needs no user input.
///
/// `initial` is the declared initial value of the argument or member and
/// `supplied` a value provided by the caller. Scalars are initialized when
/// either is present. Aggregates are initialized only when every member,
/// recursively, is; arrays when a value is present and every element is.
pub fn is_fully_initialized(type_: &ArgumentType, initial: Option<&str>, supplied: Option<&JsonValue>) -> bool {
    match type_.kind() {
        EngKind::Aggregate => {
            let parsed_initial = if supplied.is_none() {
                initial.and_then(parse_json_initial)
            } else {
                None
            };
            let source = supplied.or(parsed_initial.as_ref());
            type_.member.iter().all(|member| {
                let member_supplied = source.and_then(|s| s.get(&member.name));
                is_fully_initialized(&member.type_, member.initial_value.as_deref(), member_supplied)
            })
        }
        EngKind::Array(_) => {
            let parsed_initial = if supplied.is_none() {
                initial.and_then(parse_json_initial)
            } else {
                None
            };
            match (supplied.or(parsed_initial.as_ref()), &type_.element_type) {
                (Some(JsonValue::Array(items)), Some(element)) => items
                    .iter()
                    .all(|item| is_fully_initialized(element, None, Some(item))),
                (Some(JsonValue::Array(_)), None) => true,
                _ => false,
            }
        }
        _ => supplied.is_some() || initial.is_some(),
    }
}
