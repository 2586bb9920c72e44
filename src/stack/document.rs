//! Stack document format.
//!
//! JSON (`.ycs`) is the native format:
//!
//! ```json
//! { "advancement": { "acknowledgment": "Acknowledge_Queued", "wait": 0 },
//!   "steps": [ { "type": "command", "name": "/YSS/SWITCH", "arguments": [..] },
//!              { "type": "verify", "condition": [..], "delay": 0 } ] }
//! ```
//!
//! Older documents list command steps under `"commands"` without a `type`
//! tag; they are accepted on read. The legacy XML format (`<commandStack>`)
//! only carries command steps.

use mdb_types::Command;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::Write;
use std::path::Path;
use tracing::{debug, warn};

use crate::argument_tree::is_complex;
use crate::error::DocumentError;
use crate::stack::advancement::AdvancementParams;
use crate::stack::entry::{CommandStep, StackedEntry, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackFormat {
    Json,
    Xml,
}

impl StackFormat {
    /// Format implied by a file extension (`.ycs`/`.json` or `.xml`)
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "ycs" | "json" => Ok(StackFormat::Json),
            "xml" => Ok(StackFormat::Xml),
            other => Err(DocumentError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// An ordered stack of entries plus its stack-level advancement policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackDocument {
    #[serde(default = "AdvancementParams::default_stack")]
    pub advancement: AdvancementParams,
    #[serde(default)]
    pub steps: Vec<StackedEntry>,
}

impl Default for StackDocument {
    fn default() -> Self {
        Self {
            advancement: AdvancementParams::default_stack(),
            steps: Vec::new(),
        }
    }
}

/// Problem found by `StackDocument::check`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepProblem {
    pub index: usize,
    pub message: String,
}

impl StackDocument {
    pub fn new(steps: Vec<StackedEntry>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    pub fn parse(text: &str, format: StackFormat) -> Result<Self, DocumentError> {
        match format {
            StackFormat::Json => Self::from_json(text),
            StackFormat::Xml => Self::from_xml(text),
        }
    }

    /// Load a document, picking the format from the file extension
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let format = StackFormat::from_path(path)?;
        let text = std::fs::read_to_string(path)?;
        let document = Self::parse(&text, format)?;
        debug!(
            "Loaded {} steps from {}",
            document.steps.len(),
            path.display()
        );
        Ok(document)
    }

    pub fn format(&self, format: StackFormat) -> Result<String, DocumentError> {
        match format {
            StackFormat::Json => self.to_json(),
            StackFormat::Xml => self.to_xml(),
        }
    }

    // ------------------------------------------------------------------------
    // JSON
    // ------------------------------------------------------------------------

    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        let mut root: JsonValue = serde_json::from_str(text)?;
        if let Some(obj) = root.as_object_mut() {
            if !obj.contains_key("steps") {
                if let Some(JsonValue::Array(mut commands)) = obj.remove("commands") {
                    for command in commands.iter_mut() {
                        if let Some(c) = command.as_object_mut() {
                            c.entry("type")
                                .or_insert_with(|| JsonValue::String("command".to_string()));
                        }
                    }
                    obj.insert("steps".to_string(), JsonValue::Array(commands));
                }
            }
        }
        Ok(serde_json::from_value(root)?)
    }

    /// Pretty-printed JSON with authoring fields only
    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    // ------------------------------------------------------------------------
    // XML
    // ------------------------------------------------------------------------

    pub fn from_xml(text: &str) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut steps = Vec::new();
        let mut current: Option<StackedEntry> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    if let Some(entry) = handle_element(&e, &mut current)? {
                        current = Some(entry);
                    }
                }
                Event::Empty(e) => {
                    if let Some(entry) = handle_element(&e, &mut current)? {
                        steps.push(entry);
                    }
                }
                Event::End(e) => {
                    if e.name().as_ref() == b"command" {
                        if let Some(entry) = current.take() {
                            steps.push(entry);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Self::new(steps))
    }

    /// Legacy XML; fails on any step that is not a command
    pub fn to_xml(&self) -> Result<String, DocumentError> {
        let mut xml = String::new();
        writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#).ok();
        writeln!(xml, "<commandStack>").ok();
        for (index, entry) in self.steps.iter().enumerate() {
            let Step::Command(step) = &entry.step else {
                return Err(DocumentError::XmlUnsupportedStep { index });
            };
            write!(xml, r#"  <command qualifiedName="{}""#, escape(&step.name)).ok();
            if let Some(ns) = &step.namespace {
                write!(xml, r#" namespace="{}""#, escape(ns)).ok();
            }
            if let Some(comment) = &entry.comment {
                write!(xml, r#" comment="{}""#, escape(comment)).ok();
            }
            writeln!(xml, ">").ok();
            for (name, value) in &step.args {
                writeln!(
                    xml,
                    r#"    <commandArgument argumentName="{}" argumentValue="{}"/>"#,
                    escape(name),
                    escape(&xml_value(value))
                )
                .ok();
            }
            if !step.extra.is_empty() {
                writeln!(xml, "    <extraOptions>").ok();
                for (id, value) in &step.extra {
                    writeln!(
                        xml,
                        r#"      <extraOption id="{}" value="{}"/>"#,
                        escape(id),
                        escape(&xml_value(value))
                    )
                    .ok();
                }
                writeln!(xml, "    </extraOptions>").ok();
            }
            writeln!(xml, "  </command>").ok();
        }
        writeln!(xml, "</commandStack>").ok();
        Ok(xml)
    }

    // ------------------------------------------------------------------------
    // CHECKS
    // ------------------------------------------------------------------------

    /// Steps that cannot run as authored
    pub fn check(&self) -> Vec<StepProblem> {
        let mut problems = Vec::new();
        for (index, entry) in self.steps.iter().enumerate() {
            let message = match &entry.step {
                Step::Command(c) if c.name.trim().is_empty() => Some("command has no name"),
                Step::Verify(v) if v.condition.is_empty() => Some("verify step has no conditions"),
                Step::Check(c) if c.parameters.is_empty() => Some("check step has no parameters"),
                _ => None,
            };
            if let Some(message) = message {
                problems.push(StepProblem {
                    index,
                    message: message.to_string(),
                });
            }
        }
        problems
    }
}

fn handle_element(e: &BytesStart<'_>, current: &mut Option<StackedEntry>) -> Result<Option<StackedEntry>, DocumentError> {
    match e.name().as_ref() {
        b"command" => {
            let name = required_attribute(e, "command", "qualifiedName")?;
            let mut step = CommandStep::new(name);
            step.namespace = attribute(e, "namespace")?;
            let mut entry = StackedEntry::command(step);
            entry.comment = attribute(e, "comment")?;
            Ok(Some(entry))
        }
        b"commandArgument" => {
            let name = required_attribute(e, "commandArgument", "argumentName")?;
            let value = required_attribute(e, "commandArgument", "argumentValue")?;
            if let Some(StackedEntry {
                step: Step::Command(step),
                ..
            }) = current
            {
                step.args.insert(name, xml_literal(value));
            } else {
                warn!("commandArgument '{}' outside of a command, ignoring", name);
            }
            Ok(None)
        }
        b"extraOption" => {
            let id = required_attribute(e, "extraOption", "id")?;
            let value = required_attribute(e, "extraOption", "value")?;
            if let Some(StackedEntry {
                step: Step::Command(step),
                ..
            }) = current
            {
                step.extra.insert(id, xml_literal(value));
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, DocumentError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn required_attribute(e: &BytesStart<'_>, element: &str, key: &str) -> Result<String, DocumentError> {
    attribute(e, key)?.ok_or_else(|| DocumentError::MissingAttribute {
        element: element.to_string(),
        attribute: key.to_string(),
    })
}

/// `"true"`/`"false"` are booleans, everything else stays text
fn xml_literal(value: String) -> JsonValue {
    match value.as_str() {
        "true" => JsonValue::Bool(true),
        "false" => JsonValue::Bool(false),
        _ => JsonValue::String(value),
    }
}

fn xml_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// Decode aggregate and array arguments stored as JSON text (as the XML
/// format does) using the command definition
pub fn expand_complex_arguments(step: &mut CommandStep, command: &Command) {
    for (name, value) in step.args.iter_mut() {
        let JsonValue::String(text) = &*value else {
            continue;
        };
        if !is_complex(command, name) {
            continue;
        }
        match serde_json::from_str::<JsonValue>(text) {
            Ok(parsed) => *value = parsed,
            Err(e) => warn!("Argument '{}' is not valid JSON: {}", name, e),
        }
    }
}
