//! Merged command-history record.
//!
//! The backend pushes partial command-history updates; a record accumulates
//! every update for one dispatch id. Attributes named `<Ack>_Status`,
//! `<Ack>_Time` and `<Ack>_Message` are folded into `acks_by_name`.

use chrono::{DateTime, Utc};
use mdb_types::{CommandAssignment, CommandHistoryEntry, Value};
use std::collections::BTreeMap;

use crate::argument_tree::TemplateProvider;
use crate::codec::render_value;

const STATUS_SUFFIX: &str = "_Status";
const TIME_SUFFIX: &str = "_Time";
const MESSAGE_SUFFIX: &str = "_Message";

/// Latest known state of one acknowledgment or verifier
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Acknowledgment {
    pub name: String,
    pub status: Option<String>,
    pub time: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandHistoryRecord {
    pub id: String,
    pub command_name: Option<String>,
    pub origin: Option<String>,
    pub sequence_number: Option<u64>,
    pub generation_time: Option<DateTime<Utc>>,
    pub assignments: Vec<CommandAssignment>,
    /// Every attribute by name, last value wins
    pub attributes: BTreeMap<String, Value>,
    pub acks_by_name: BTreeMap<String, Acknowledgment>,
}

impl CommandHistoryRecord {
    pub fn from_entry(entry: &CommandHistoryEntry) -> Self {
        let mut record = Self {
            id: entry.id.clone(),
            ..Default::default()
        };
        record.merge(entry);
        record
    }

    /// Fold a further update for the same command into this record
    pub fn merge(&mut self, entry: &CommandHistoryEntry) {
        if entry.command_name.is_some() {
            self.command_name = entry.command_name.clone();
        }
        if entry.origin.is_some() {
            self.origin = entry.origin.clone();
        }
        if entry.sequence_number.is_some() {
            self.sequence_number = entry.sequence_number;
        }
        if entry.generation_time.is_some() {
            self.generation_time = entry.generation_time;
        }
        for assignment in &entry.assignments {
            match self.assignments.iter_mut().find(|a| a.name == assignment.name) {
                Some(existing) => *existing = assignment.clone(),
                None => self.assignments.push(assignment.clone()),
            }
        }
        for attr in &entry.attr {
            self.attributes.insert(attr.name.clone(), attr.value.clone());
            self.fold_acknowledgment(&attr.name, &attr.value);
        }
    }

    fn fold_acknowledgment(&mut self, attr: &str, value: &Value) {
        let (name, field) = if let Some(name) = attr.strip_suffix(STATUS_SUFFIX) {
            (name, STATUS_SUFFIX)
        } else if let Some(name) = attr.strip_suffix(TIME_SUFFIX) {
            (name, TIME_SUFFIX)
        } else if let Some(name) = attr.strip_suffix(MESSAGE_SUFFIX) {
            (name, MESSAGE_SUFFIX)
        } else {
            return;
        };
        let ack = self
            .acks_by_name
            .entry(name.to_string())
            .or_insert_with(|| Acknowledgment {
                name: name.to_string(),
                ..Default::default()
            });
        let text = Some(render_value(value));
        match field {
            STATUS_SUFFIX => ack.status = text,
            TIME_SUFFIX => ack.time = text,
            _ => ack.message = text,
        }
    }

    pub fn comment(&self) -> Option<String> {
        self.attributes.get("comment").map(render_value)
    }

    /// Status of the final `CommandComplete` acknowledgment, if reported
    pub fn completion_status(&self) -> Option<&str> {
        self.acks_by_name
            .get(crate::stack::advancement::COMMAND_COMPLETE)
            .and_then(|a| a.status.as_deref())
    }
}

impl TemplateProvider for CommandHistoryRecord {
    fn assignment(&self, name: &str) -> Option<Value> {
        self.assignments
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.clone())
    }

    fn option(&self, id: &str) -> Option<Value> {
        self.attributes.get(id).cloned()
    }

    fn comment(&self) -> Option<String> {
        CommandHistoryRecord::comment(self)
    }
}
