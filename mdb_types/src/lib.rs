//! Mission Database Types - Level 1 Foundation Types
//!
//! This crate contains the read-only descriptors the backend serves from its
//! mission database (commands, arguments, argument types, array dimensions,
//! verifiers) together with the typed values it pushes for parameters.
//!
//! ## Architecture Level: LEVEL 1 (Foundation)
//!
//! All other crates in the workspace depend on this crate, but this crate
//! depends on nothing else in the workspace.
//!
//! ## Critical Rules
//!
//! 1. **NO BUSINESS LOGIC** - Only data structures, constructors and accessors
//! 2. **NO WORKSPACE DEPENDENCIES**
//! 3. **SERIALIZABLE** - Field names follow the backend's camelCase JSON
//! 4. **IMMUTABLE** - Descriptors are owned by the backend; the client never edits them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Name of a parameter or command, optionally scoped to an alias namespace.
///
/// Without a namespace the name is a fully qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamedObjectId {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl NamedObjectId {
    /// Identifier by qualified name
    pub fn qualified(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    /// Identifier by alias within a namespace
    pub fn aliased(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }
}

impl std::fmt::Display for NamedObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}:{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

// ============================================================================
// TYPED VALUES
// ============================================================================

/// Aggregate value: parallel lists of member names and member values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateValue {
    pub name: Vec<String>,
    pub value: Vec<Value>,
}

impl AggregateValue {
    /// Look up a member by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.name
            .iter()
            .position(|n| n == name)
            .and_then(|idx| self.value.get(idx))
    }

    /// Append a member
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.name.push(name.into());
        self.value.push(value);
    }

    /// Iterate members in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.name.iter().map(String::as_str).zip(self.value.iter())
    }
}

/// The backend's typed value representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Value {
    Float(f32),
    Double(f64),
    Uint32(u32),
    Sint32(i32),
    Uint64(u64),
    Sint64(i64),
    Boolean(bool),
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
    String(String),
    /// Enumeration state label
    Enumerated(String),
    /// ISO 8601 UTC timestamp string
    Timestamp(String),
    Aggregate(AggregateValue),
    Array(Vec<Value>),
}

impl Value {
    /// Wire name of the value type
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE",
            Value::Uint32(_) => "UINT32",
            Value::Sint32(_) => "SINT32",
            Value::Uint64(_) => "UINT64",
            Value::Sint64(_) => "SINT64",
            Value::Boolean(_) => "BOOLEAN",
            Value::Binary(_) => "BINARY",
            Value::String(_) => "STRING",
            Value::Enumerated(_) => "ENUMERATED",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Aggregate(_) => "AGGREGATE",
            Value::Array(_) => "ARRAY",
        }
    }

    pub fn as_aggregate(&self) -> Option<&AggregateValue> {
        match self {
            Value::Aggregate(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// PARAMETER VALUES
// ============================================================================

/// Acquisition status of a parameter sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcquisitionStatus {
    Acquired,
    NotReceived,
    Invalid,
    Expired,
}

/// A timestamped parameter sample as pushed by the live feed
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NamedObjectId>,
    /// Subscription-scoped numeric id; resolved through the subscription mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eng_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition_status: Option<AcquisitionStatus>,
}

impl ParameterValue {
    /// Sample carrying only an engineering value
    pub fn with_eng_value(value: Value) -> Self {
        Self {
            eng_value: Some(value),
            acquisition_status: Some(AcquisitionStatus::Acquired),
            ..Default::default()
        }
    }
}

/// One push of a parameter subscription.
///
/// `mapping` (re)defines the numeric ids used by `values` and `invalid`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<std::collections::BTreeMap<u32, NamedObjectId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<ParameterValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid: Option<Vec<u32>>,
}

// ============================================================================
// COMMAND HISTORY
// ============================================================================

/// Attribute of a command-history update (acknowledgment status, comment, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandHistoryAttribute {
    pub name: String,
    pub value: Value,
}

/// Argument value as recorded with an issued command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAssignment {
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub user_input: bool,
}

/// One command-history update as pushed by the backend.
///
/// Successive updates for the same `id` are partial and must be merged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandHistoryEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attr: Vec<CommandHistoryAttribute>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignments: Vec<CommandAssignment>,
}

// ============================================================================
// ARGUMENT TYPES
// ============================================================================

/// Classification of an `engType` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngKind {
    Boolean,
    Binary,
    Integer,
    Float,
    String,
    Time,
    Enumeration,
    Aggregate,
    /// `<kind>[]`; carries the element kind name
    Array(String),
    Unknown(String),
}

impl EngKind {
    /// Classify a raw `engType`
    pub fn of(eng_type: &str) -> Self {
        if let Some(element) = eng_type.strip_suffix("[]") {
            return EngKind::Array(element.to_string());
        }
        match eng_type {
            "boolean" => EngKind::Boolean,
            "binary" => EngKind::Binary,
            "integer" => EngKind::Integer,
            "float" | "double" => EngKind::Float,
            "string" => EngKind::String,
            "time" => EngKind::Time,
            "enumeration" => EngKind::Enumeration,
            "aggregate" => EngKind::Aggregate,
            other => EngKind::Unknown(other.to_string()),
        }
    }
}

/// One state of an enumerated type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub value: i64,
    pub label: String,
}

/// Reference to a parameter from a dimension descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRef {
    pub qualified_name: String,
}

/// Length of one axis of an array argument.
///
/// Exactly one of `fixed_value`, `argument` or `parameter` is expected to be
/// set. `slope` and `intercept` apply to the referenced value as
/// `n * slope + intercept`; they default to 1 and 0.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentDimension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<ParameterRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slope: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intercept: Option<i64>,
}

impl ArgumentDimension {
    pub fn fixed(length: i64) -> Self {
        Self {
            fixed_value: Some(length),
            ..Default::default()
        }
    }

    pub fn from_argument(name: impl Into<String>, slope: i64, intercept: i64) -> Self {
        Self {
            argument: Some(name.into()),
            slope: Some(slope),
            intercept: Some(intercept),
            ..Default::default()
        }
    }

    pub fn from_parameter(qualified_name: impl Into<String>, slope: i64, intercept: i64) -> Self {
        Self {
            parameter: Some(ParameterRef {
                qualified_name: qualified_name.into(),
            }),
            slope: Some(slope),
            intercept: Some(intercept),
            ..Default::default()
        }
    }
}

/// Type descriptor of an argument, aggregate member or array element.
///
/// Which fields are meaningful is selected by `eng_type`: scalar rules for
/// scalar kinds, `member` for aggregates, `element_type` + `dimensions` for
/// arrays.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentType {
    pub eng_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub member: Vec<ArgumentMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<Box<ArgumentType>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<ArgumentDimension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_value: Vec<EnumValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_chars: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chars: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_bytes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed: Option<bool>,
    /// Literal that denotes `true` for boolean types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_string_value: Option<String>,
    /// Literal that denotes `false` for boolean types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero_string_value: Option<String>,
}

impl ArgumentType {
    /// Bare type of the given kind
    pub fn of(eng_type: impl Into<String>) -> Self {
        Self {
            eng_type: eng_type.into(),
            ..Default::default()
        }
    }

    /// Aggregate type with the given members
    pub fn aggregate(member: Vec<ArgumentMember>) -> Self {
        Self {
            eng_type: "aggregate".to_string(),
            member,
            ..Default::default()
        }
    }

    /// Array type over `element` with the given dimensions
    pub fn array(element: ArgumentType, dimensions: Vec<ArgumentDimension>) -> Self {
        Self {
            eng_type: format!("{}[]", element.eng_type),
            element_type: Some(Box::new(element)),
            dimensions,
            ..Default::default()
        }
    }

    pub fn kind(&self) -> EngKind {
        EngKind::of(&self.eng_type)
    }

    pub fn is_aggregate(&self) -> bool {
        self.eng_type == "aggregate"
    }

    pub fn is_array(&self) -> bool {
        self.eng_type.ends_with("[]")
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

/// A member of an aggregate argument type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentMember {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ArgumentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<String>,
}

/// A command argument declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub type_: ArgumentType,
    /// Static initial value; aggregates and arrays carry JSON text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<String>,
}

impl Argument {
    pub fn new(name: impl Into<String>, type_: ArgumentType) -> Self {
        Self {
            name: name.into(),
            description: None,
            type_,
            initial_value: None,
        }
    }

    pub fn with_initial(mut self, initial_value: impl Into<String>) -> Self {
        self.initial_value = Some(initial_value.into());
        self
    }
}

/// A fixed argument value set by a command in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentAssignment {
    pub name: String,
    pub value: String,
}

/// A post-dispatch verification stage declared on a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verifier {
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Command definition with its link to the base command
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub name: String,
    pub qualified_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alias: Vec<NamedObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_command: Option<Box<Command>>,
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub argument: Vec<Argument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub argument_assignment: Vec<ArgumentAssignment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verifier: Vec<Verifier>,
}

impl Command {
    /// Create a command named after the last path segment of `qualified_name`
    pub fn new(qualified_name: impl Into<String>) -> Self {
        let qualified_name = qualified_name.into();
        let name = qualified_name
            .rsplit('/')
            .next()
            .unwrap_or(qualified_name.as_str())
            .to_string();
        Self {
            name,
            qualified_name,
            ..Default::default()
        }
    }

    /// Alias of this command within `namespace`, if any
    pub fn alias_in(&self, namespace: &str) -> Option<&NamedObjectId> {
        self.alias
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace))
    }
}

// ============================================================================
// PROCESSOR AND OPTIONS
// ============================================================================

/// Processor-specific acknowledgment declared by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgmentInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Value type of a configured extra command option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandOptionType {
    Boolean,
    Number,
    String,
    Timestamp,
}

/// Extra option that can accompany an issued command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOption {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: CommandOptionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eng_kind_classifies_arrays_and_unknowns() {
        assert_eq!(EngKind::of("integer[]"), EngKind::Array("integer".into()));
        assert_eq!(EngKind::of("double"), EngKind::Float);
        assert_eq!(EngKind::of("quaternion"), EngKind::Unknown("quaternion".into()));
    }

    #[test]
    fn binary_value_serializes_as_base64() {
        let json = serde_json::to_value(Value::Binary(vec![0xca, 0xfe])).unwrap();
        assert_eq!(json["type"], "BINARY");
        assert_eq!(json["value"], "yv4=");
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, Value::Binary(vec![0xca, 0xfe]));
    }

    #[test]
    fn command_deserializes_backend_json() {
        let json = r#"{
            "name": "SWITCH",
            "qualifiedName": "/YSS/SWITCH",
            "baseCommand": { "name": "BASE", "qualifiedName": "/YSS/BASE", "abstract": true },
            "argument": [
                { "name": "mode", "type": { "engType": "enumeration",
                  "enumValue": [{ "value": 0, "label": "OFF" }] } }
            ],
            "argumentAssignment": [{ "name": "opcode", "value": "7" }]
        }"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.argument[0].type_.kind(), EngKind::Enumeration);
        assert!(cmd.base_command.unwrap().is_abstract);
        assert_eq!(cmd.argument_assignment[0].value, "7");
    }

    #[test]
    fn aggregate_lookup_by_member_name() {
        let mut agg = AggregateValue::default();
        agg.push("x", Value::Sint32(1));
        agg.push("y", Value::Sint32(2));
        assert_eq!(agg.get("y"), Some(&Value::Sint32(2)));
        assert_eq!(agg.get("z"), None);
    }
}
