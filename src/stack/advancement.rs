//! Advancement resolver.
//!
//! Decides when a stack runner may move past a command step: after a named
//! acknowledgment reaches an accepting status, optionally followed by a
//! settle time (`wait`).
//!
//! The acknowledgment catalog offered for selection is ordered:
//!
//! ```text
//! (Inherit) < built-ins < Verifier_<stage> < processor extras < custom
//! ```
//!
//! A stored acknowledgment resolves back to the first catalog entry with the
//! same id, otherwise to `custom` with the stored name as free text.

use mdb_types::{AcknowledgmentInfo, Command};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::argument_tree::command_hierarchy;
use crate::stack::record::CommandHistoryRecord;

/// Id of the "inherit the stack default" selection
pub const INHERIT: &str = "";

/// Id of the free-text selection
pub const CUSTOM: &str = "custom";

pub const ACK_QUEUED: &str = "Acknowledge_Queued";
pub const ACK_RELEASED: &str = "Acknowledge_Released";
pub const ACK_SENT: &str = "Acknowledge_Sent";
pub const COMMAND_COMPLETE: &str = "CommandComplete";

const BUILT_IN: [(&str, &str); 4] = [
    (ACK_QUEUED, "Queued"),
    (ACK_RELEASED, "Released"),
    (ACK_SENT, "Sent"),
    (COMMAND_COMPLETE, "Completed"),
];

/// When a command step is considered done
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancementParams {
    /// Acknowledgment (or verifier) name to wait for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledgment: Option<String>,
    /// Settle time in milliseconds after the acknowledgment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<u64>,
}

impl AdvancementParams {
    /// Stack-level default: continue once queued, without settle time
    pub fn default_stack() -> Self {
        Self {
            acknowledgment: Some(ACK_QUEUED.to_string()),
            wait: Some(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.acknowledgment.is_none() && self.wait.is_none()
    }
}

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckSource {
    Inherit,
    BuiltIn,
    Verifier,
    Processor,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckOption {
    pub id: String,
    pub label: String,
    pub source: AckSource,
}

impl AckOption {
    fn new(id: impl Into<String>, label: impl Into<String>, source: AckSource) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            source,
        }
    }
}

/// Selectable acknowledgments for a command step.
///
/// `command` contributes one `Verifier_<stage>` per verifier across its
/// hierarchy; `extras` are the processor's own acknowledgments. The
/// `Inherit` option is only offered for entry-level choices.
pub fn acknowledgment_catalog(
    command: Option<&Command>,
    extras: &[AcknowledgmentInfo],
    with_inherit: bool,
) -> Vec<AckOption> {
    let mut catalog = Vec::new();
    if with_inherit {
        catalog.push(AckOption::new(INHERIT, "Inherit", AckSource::Inherit));
    }
    for (id, label) in BUILT_IN {
        catalog.push(AckOption::new(id, label, AckSource::BuiltIn));
    }
    if let Some(command) = command {
        for c in command_hierarchy(command) {
            for verifier in &c.verifier {
                let id = format!("Verifier_{}", verifier.stage);
                if !catalog.iter().any(|o| o.id == id) {
                    catalog.push(AckOption::new(id, verifier.stage.clone(), AckSource::Verifier));
                }
            }
        }
    }
    for ack in extras {
        let label = ack.name.strip_prefix("Acknowledge_").unwrap_or(&ack.name);
        catalog.push(AckOption::new(ack.name.clone(), label, AckSource::Processor));
    }
    catalog.push(AckOption::new(CUSTOM, "Custom", AckSource::Custom));
    catalog
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// A user's choice in the advancement controls
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AckSelection {
    /// Selected catalog id (`INHERIT`, a known id, or `CUSTOM`)
    pub ack_id: String,
    /// Free-text acknowledgment, used with `CUSTOM`
    pub custom: String,
    pub wait: Option<u64>,
}

/// Where an advancement choice comes from
#[derive(Debug, Clone)]
pub enum AdvancementSource<'a> {
    Selection(&'a AckSelection),
    Template(&'a AdvancementParams),
}

/// Map a stored acknowledgment back to a selection.
///
/// First catalog match wins; unknown names become `CUSTOM` with the name
/// preserved as free text.
pub fn classify_acknowledgment(catalog: &[AckOption], stored: Option<&AdvancementParams>) -> AckSelection {
    let wait = stored.and_then(|p| p.wait);
    let Some(ack) = stored.and_then(|p| p.acknowledgment.as_deref()) else {
        let ack_id = if catalog.iter().any(|o| o.source == AckSource::Inherit) {
            INHERIT
        } else {
            ACK_QUEUED
        };
        return AckSelection {
            ack_id: ack_id.to_string(),
            custom: String::new(),
            wait,
        };
    };
    match catalog.iter().find(|o| o.id == ack && o.source != AckSource::Custom) {
        Some(option) => AckSelection {
            ack_id: option.id.clone(),
            custom: String::new(),
            wait,
        },
        None => {
            debug!("Acknowledgment '{}' not in catalog, classifying as custom", ack);
            AckSelection {
                ack_id: CUSTOM.to_string(),
                custom: ack.to_string(),
                wait,
            }
        }
    }
}

/// Effective advancement policy of a selection, or `None` for "inherit".
///
/// Known ids are used verbatim; `CUSTOM` and unknown ids use the trimmed
/// free text. `wait` is kept regardless of the acknowledgment.
pub fn resolve_selection(catalog: &[AckOption], selection: &AckSelection) -> Option<AdvancementParams> {
    let known = catalog
        .iter()
        .find(|o| o.id == selection.ack_id && o.source != AckSource::Custom);

    let acknowledgment = match known {
        Some(option) if option.source == AckSource::Inherit => None,
        Some(option) => Some(option.id.clone()),
        None => {
            if selection.ack_id != CUSTOM {
                warn!(
                    "Unknown acknowledgment id '{}', using custom text",
                    selection.ack_id
                );
            }
            let text = selection.custom.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
    };

    let params = AdvancementParams {
        acknowledgment,
        wait: selection.wait,
    };
    (!params.is_empty()).then_some(params)
}

/// Resolve the advancement policy of a command step.
pub fn resolve_advancement(
    command: Option<&Command>,
    extras: &[AcknowledgmentInfo],
    source: AdvancementSource<'_>,
) -> Option<AdvancementParams> {
    let catalog = acknowledgment_catalog(command, extras, true);
    match source {
        AdvancementSource::Selection(selection) => resolve_selection(&catalog, selection),
        AdvancementSource::Template(params) => {
            let selection = classify_acknowledgment(&catalog, Some(params));
            resolve_selection(&catalog, &selection)
        }
    }
}

/// Policy actually applied to an entry: its own non-empty acknowledgment and
/// its own wait, each falling back to the stack default independently
pub fn effective_advancement(entry: Option<&AdvancementParams>, stack: &AdvancementParams) -> AdvancementParams {
    let acknowledgment = entry
        .and_then(|p| p.acknowledgment.clone())
        .filter(|a| !a.is_empty())
        .or_else(|| stack.acknowledgment.clone())
        .or_else(|| Some(ACK_QUEUED.to_string()));
    let wait = entry
        .and_then(|p| p.wait)
        .or(stack.wait)
        .or(Some(0));
    AdvancementParams { acknowledgment, wait }
}

/// What the runner should do with a dispatched command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckDecision {
    /// Continue after `delay_ms`
    Continue { delay_ms: u64 },
    /// Stop the run; the acknowledgment reported a stopping status
    Stop { status: String },
    /// Acknowledgment not (yet) in a decisive state
    Wait,
}

/// Decide on a command step from its merged history record
pub fn decide(
    record: &CommandHistoryRecord,
    policy: &AdvancementParams,
    accepting: &[String],
    stopping: &[String],
) -> AckDecision {
    let Some(name) = policy.acknowledgment.as_deref() else {
        return AckDecision::Wait;
    };
    let Some(status) = record.acks_by_name.get(name).and_then(|a| a.status.as_deref()) else {
        return AckDecision::Wait;
    };
    if accepting.iter().any(|s| s == status) {
        AckDecision::Continue {
            delay_ms: policy.wait.unwrap_or(0),
        }
    } else if stopping.iter().any(|s| s == status) {
        AckDecision::Stop {
            status: status.to_string(),
        }
    } else {
        AckDecision::Wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdb_types::{CommandHistoryAttribute, CommandHistoryEntry, Value, Verifier};

    fn command_with_verifiers() -> Command {
        let mut base = Command::new("/YSS/BASE");
        base.verifier = vec![Verifier {
            stage: "Started".into(),
            description: None,
        }];
        let mut cmd = Command::new("/YSS/CMD");
        cmd.base_command = Some(Box::new(base));
        cmd.verifier = vec![Verifier {
            stage: "Complete".into(),
            description: None,
        }];
        cmd
    }

    fn extras() -> Vec<AcknowledgmentInfo> {
        vec![AcknowledgmentInfo {
            name: "Acknowledge_Radiated".into(),
            description: None,
        }]
    }

    #[test]
    fn catalog_order() {
        let cmd = command_with_verifiers();
        let ids: Vec<String> = acknowledgment_catalog(Some(&cmd), &extras(), true)
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(
            ids,
            vec![
                "",
                "Acknowledge_Queued",
                "Acknowledge_Released",
                "Acknowledge_Sent",
                "CommandComplete",
                "Verifier_Started",
                "Verifier_Complete",
                "Acknowledge_Radiated",
                "custom",
            ]
        );
    }

    #[test]
    fn unknown_id_falls_back_to_custom_with_text_preserved() {
        let catalog = acknowledgment_catalog(None, &extras(), true);
        let stored = AdvancementParams {
            acknowledgment: Some("Acknowledge_Frobbed".into()),
            wait: None,
        };
        let selection = classify_acknowledgment(&catalog, Some(&stored));
        assert_eq!(selection.ack_id, CUSTOM);
        assert_eq!(selection.custom, "Acknowledge_Frobbed");
        assert_eq!(resolve_selection(&catalog, &selection), Some(stored));
    }

    #[test]
    fn known_id_is_used_verbatim() {
        let cmd = command_with_verifiers();
        let selection = AckSelection {
            ack_id: "Verifier_Complete".into(),
            custom: "ignored".into(),
            wait: None,
        };
        let resolved = resolve_advancement(Some(&cmd), &[], AdvancementSource::Selection(&selection));
        assert_eq!(resolved.and_then(|p| p.acknowledgment).as_deref(), Some("Verifier_Complete"));
    }

    #[test]
    fn custom_text_is_trimmed_and_wait_kept() {
        let selection = AckSelection {
            ack_id: CUSTOM.into(),
            custom: "  Acknowledge_X ".into(),
            wait: Some(1500),
        };
        let resolved = resolve_advancement(None, &[], AdvancementSource::Selection(&selection));
        assert_eq!(
            resolved,
            Some(AdvancementParams {
                acknowledgment: Some("Acknowledge_X".into()),
                wait: Some(1500),
            })
        );
    }

    #[test]
    fn inherit_without_wait_is_no_policy() {
        let selection = AckSelection::default();
        assert_eq!(resolve_advancement(None, &[], AdvancementSource::Selection(&selection)), None);

        let wait_only = AckSelection {
            wait: Some(200),
            ..Default::default()
        };
        assert_eq!(
            resolve_advancement(None, &[], AdvancementSource::Selection(&wait_only)),
            Some(AdvancementParams {
                acknowledgment: None,
                wait: Some(200)
            })
        );
    }

    #[test]
    fn template_resolves_through_catalog() {
        let stored = AdvancementParams {
            acknowledgment: Some("Acknowledge_Radiated".into()),
            wait: Some(0),
        };
        let resolved = resolve_advancement(None, &extras(), AdvancementSource::Template(&stored));
        assert_eq!(resolved, Some(stored));
    }

    #[test]
    fn entry_fields_fall_back_independently() {
        let stack = AdvancementParams {
            acknowledgment: Some("Acknowledge_Sent".into()),
            wait: Some(100),
        };
        let entry = AdvancementParams {
            acknowledgment: Some(String::new()),
            wait: Some(0),
        };
        assert_eq!(
            effective_advancement(Some(&entry), &stack),
            AdvancementParams {
                acknowledgment: Some("Acknowledge_Sent".into()),
                wait: Some(0)
            }
        );
        assert_eq!(effective_advancement(None, &stack), stack);
    }

    fn record_with(ack: &str, status: &str) -> CommandHistoryRecord {
        CommandHistoryRecord::from_entry(&CommandHistoryEntry {
            id: "cmd-1".into(),
            attr: vec![CommandHistoryAttribute {
                name: format!("{ack}_Status"),
                value: Value::String(status.into()),
            }],
            ..Default::default()
        })
    }

    #[test]
    fn decision_follows_status_sets() {
        let accepting = vec!["OK".to_string(), "DISABLED".to_string()];
        let stopping = vec!["NOK".to_string(), "CANCELLED".to_string()];
        let policy = AdvancementParams {
            acknowledgment: Some("Acknowledge_Sent".into()),
            wait: Some(250),
        };

        assert_eq!(
            decide(&record_with("Acknowledge_Sent", "DISABLED"), &policy, &accepting, &stopping),
            AckDecision::Continue { delay_ms: 250 }
        );
        assert_eq!(
            decide(&record_with("Acknowledge_Sent", "NOK"), &policy, &accepting, &stopping),
            AckDecision::Stop { status: "NOK".into() }
        );
        assert_eq!(
            decide(&record_with("Acknowledge_Sent", "PENDING"), &policy, &accepting, &stopping),
            AckDecision::Wait
        );
        assert_eq!(
            decide(&record_with("Acknowledge_Queued", "OK"), &policy, &accepting, &stopping),
            AckDecision::Wait
        );
    }
}
