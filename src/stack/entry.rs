//! Stacked entries: one per authored stack line.
//!
//! An entry is a closed sum of four step kinds sharing a common base
//! (comment plus execution bookkeeping). Only authoring fields are
//! serialized; execution outcomes live in `#[serde(skip)]` fields and are
//! reset by `clear_outputs`.

use mdb_types::{Command, NamedObjectId, Value};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::argument_tree::TemplateProvider;
use crate::codec::{render_json_scalar, value_from_json};
use crate::dimension::ParameterLookup;
use crate::stack::advancement::AdvancementParams;
use crate::stack::record::CommandHistoryRecord;
use crate::stack::verify::{cancel_pending, evaluate, Comparison, ComparisonStatus, NamedParameterValue};

/// Execution outcome shared by every step kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionState {
    /// Set once the entry has been dispatched
    pub execution_number: Option<u64>,
    pub executing: bool,
    /// Last execution error
    pub err: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackedEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(flatten)]
    pub step: Step,
    #[serde(skip)]
    pub state: ExecutionState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    Command(CommandStep),
    Verify(VerifyStep),
    Check(CheckStep),
    Text(TextStep),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandStep {
    /// Qualified name, or alias when `namespace` is set
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Argument values in authored order
    #[serde(
        rename = "arguments",
        default,
        with = "named_values",
        skip_serializing_if = "JsonMap::is_empty"
    )]
    pub args: JsonMap<String, JsonValue>,
    #[serde(
        rename = "extraOptions",
        default,
        with = "option_values",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub extra: BTreeMap<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advancement: Option<AdvancementParams>,
    /// Dispatch id
    #[serde(skip)]
    pub id: Option<String>,
    #[serde(skip)]
    pub record: Option<CommandHistoryRecord>,
}

impl CommandStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Step for `command`, named by its alias in `preferred_namespace` when
    /// one exists
    pub fn for_command(command: &Command, preferred_namespace: Option<&str>) -> Self {
        match preferred_namespace.and_then(|ns| command.alias_in(ns)) {
            Some(alias) => Self {
                namespace: alias.namespace.clone(),
                ..Self::new(alias.name.clone())
            },
            None => Self::new(command.qualified_name.clone()),
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Identifier used to issue this command
    pub fn command_id(&self) -> NamedObjectId {
        match &self.namespace {
            Some(ns) => NamedObjectId::aliased(ns.clone(), self.name.clone()),
            None => NamedObjectId::qualified(self.name.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyStep {
    pub condition: Vec<Comparison>,
    /// Milliseconds before the first evaluation
    #[serde(default)]
    pub delay: u64,
    /// Milliseconds after `delay` before the step fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip)]
    pub pvals: Option<Vec<NamedParameterValue>>,
}

impl VerifyStep {
    pub fn new(condition: Vec<Comparison>) -> Self {
        Self {
            condition,
            ..Default::default()
        }
    }

    /// Evaluate every comparison against `pvals`, updating the status cells
    pub fn test(&mut self, pvals: &dyn ParameterLookup) -> bool {
        let cells = self.pvals.get_or_insert_with(Vec::new);
        evaluate(&self.condition, pvals, cells)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterCheck {
    pub parameter: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckStep {
    pub parameters: Vec<ParameterCheck>,
    #[serde(skip)]
    pub pvals: Option<Vec<NamedParameterValue>>,
}

impl CheckStep {
    pub fn new<I, S>(parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parameters: parameters
                .into_iter()
                .map(|p| ParameterCheck { parameter: p.into() })
                .collect(),
            pvals: None,
        }
    }

    /// Record the current value of every checked parameter.
    ///
    /// A check never fails; a parameter without a value is recorded as such.
    pub fn test(&mut self, pvals: &dyn ParameterLookup) -> bool {
        let snapshot = self
            .parameters
            .iter()
            .map(|check| {
                let pval = pvals.latest_value(&check.parameter).cloned();
                let cell = NamedParameterValue::new(check.parameter.clone(), pval);
                if cell.pval.is_some() {
                    cell.status.set(ComparisonStatus::Ok);
                }
                cell
            })
            .collect();
        self.pvals = Some(snapshot);
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStep {
    /// Markdown documentation; not executed
    pub text: String,
}

// ============================================================================
// ENTRY BEHAVIOUR
// ============================================================================

impl StackedEntry {
    pub fn new(step: Step) -> Self {
        Self {
            comment: None,
            step,
            state: ExecutionState::default(),
        }
    }

    pub fn command(step: CommandStep) -> Self {
        Self::new(Step::Command(step))
    }

    pub fn verify(step: VerifyStep) -> Self {
        Self::new(Step::Verify(step))
    }

    pub fn check(step: CheckStep) -> Self {
        Self::new(Step::Check(step))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Step::Text(TextStep { text: text.into() }))
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn kind(&self) -> &'static str {
        match &self.step {
            Step::Command(_) => "command",
            Step::Verify(_) => "verify",
            Step::Check(_) => "check",
            Step::Text(_) => "text",
        }
    }

    /// Same authoring fields, no execution outputs
    pub fn copy(&self) -> Self {
        let mut copy = self.clone();
        copy.clear_outputs();
        copy
    }

    /// Reset execution outcomes; authoring fields are untouched
    pub fn clear_outputs(&mut self) {
        self.state = ExecutionState::default();
        match &mut self.step {
            Step::Command(c) => {
                c.id = None;
                c.record = None;
            }
            Step::Verify(v) => v.pvals = None,
            Step::Check(c) => c.pvals = None,
            Step::Text(_) => {}
        }
    }

    /// Whether running this entry produced anything worth keeping
    pub fn has_outputs(&self) -> bool {
        if self.state.execution_number.is_some() || self.state.err.is_some() {
            return true;
        }
        match &self.step {
            Step::Command(c) => c.id.is_some() || c.record.is_some(),
            Step::Verify(v) => v.pvals.is_some(),
            Step::Check(c) => c.pvals.is_some(),
            Step::Text(_) => false,
        }
    }

    /// Test a verify or check entry against the current parameter values.
    ///
    /// Command and text entries have nothing to verify and always pass.
    pub fn test(&mut self, pvals: &dyn ParameterLookup) -> bool {
        match &mut self.step {
            Step::Verify(v) => v.test(pvals),
            Step::Check(c) => c.test(pvals),
            Step::Command(_) | Step::Text(_) => true,
        }
    }

    /// Parameters this entry needs a live subscription for
    pub fn parameters(&self) -> Vec<&str> {
        match &self.step {
            Step::Verify(v) => v.condition.iter().map(|c| c.parameter.as_str()).collect(),
            Step::Check(c) => c.parameters.iter().map(|p| p.parameter.as_str()).collect(),
            Step::Command(_) | Step::Text(_) => Vec::new(),
        }
    }

    /// Turn pending comparison statuses into cancelled
    pub fn cancel(&mut self) {
        self.state.executing = false;
        if let Step::Verify(v) = &self.step {
            if let Some(cells) = &v.pvals {
                cancel_pending(cells);
            }
        }
    }
}

/// Every parameter referenced by verify and check entries of a stack
pub fn stack_parameters(entries: &[StackedEntry]) -> BTreeSet<String> {
    entries
        .iter()
        .flat_map(|e| e.parameters())
        .map(str::to_string)
        .collect()
}

impl fmt::Display for StackedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Step::Command(c) => {
                write!(f, "{}", c.command_id())?;
                if !c.args.is_empty() {
                    let args: Vec<String> = c
                        .args
                        .iter()
                        .map(|(name, value)| format!("{name}: {}", render_json_scalar(value)))
                        .collect();
                    write!(f, " {{{}}}", args.join(", "))?;
                }
                Ok(())
            }
            Step::Verify(v) => {
                let conditions: Vec<String> = v.condition.iter().map(|c| c.to_string()).collect();
                write!(f, "verify {}", conditions.join(" and "))
            }
            Step::Check(c) => {
                let names: Vec<&str> = c.parameters.iter().map(|p| p.parameter.as_str()).collect();
                write!(f, "check {}", names.join(", "))
            }
            Step::Text(t) => write!(f, "text ({} chars)", t.text.chars().count()),
        }
    }
}

impl TemplateProvider for StackedEntry {
    fn assignment(&self, name: &str) -> Option<Value> {
        match &self.step {
            Step::Command(c) => c.args.get(name).map(value_from_json),
            _ => None,
        }
    }

    fn option(&self, id: &str) -> Option<Value> {
        match &self.step {
            Step::Command(c) => c.extra.get(id).map(value_from_json),
            _ => None,
        }
    }

    fn comment(&self) -> Option<String> {
        self.comment.clone()
    }
}

// ============================================================================
// SERDE HELPERS
// ============================================================================

/// `{name: value}` map stored as `[{"name": .., "value": ..}]`
mod named_values {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::{Map as JsonMap, Value as JsonValue};

    #[derive(Serialize, Deserialize)]
    struct NamedValue {
        name: String,
        value: JsonValue,
    }

    pub fn serialize<S: Serializer>(map: &JsonMap<String, JsonValue>, serializer: S) -> Result<S::Ok, S::Error> {
        let list: Vec<NamedValue> = map
            .iter()
            .map(|(name, value)| NamedValue {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<JsonMap<String, JsonValue>, D::Error> {
        let list = Vec::<NamedValue>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|nv| (nv.name, nv.value)).collect())
    }
}

/// `{id: value}` map stored as `[{"id": .., "value": ..}]`
mod option_values {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value as JsonValue;
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize)]
    struct OptionValue {
        id: String,
        value: JsonValue,
    }

    pub fn serialize<S: Serializer>(map: &BTreeMap<String, JsonValue>, serializer: S) -> Result<S::Ok, S::Error> {
        let list: Vec<OptionValue> = map
            .iter()
            .map(|(id, value)| OptionValue {
                id: id.clone(),
                value: value.clone(),
            })
            .collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, JsonValue>, D::Error> {
        let list = Vec::<OptionValue>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|ov| (ov.id, ov.value)).collect())
    }
}
