//! Argument tree and editable argument form.
//!
//! `build_argument_tree` walks a command's inheritance chain (base command
//! first) and partitions the user-editable arguments into those that still
//! need input and those already satisfied by an initial or template value.
//! Arguments fixed by an `argumentAssignment` anywhere in the chain are not
//! editable and appear in neither list.
//!
//! `ArgumentForm` holds the editable state for one tree: it tracks which
//! controls the user touched, keeps array lengths in step with their
//! dimensions and serializes the form into the argument map sent with the
//! command-issue request.

use mdb_types::{Argument, ArgumentType, Command, CommandOption, EngKind, Value};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::codec::{
    is_fully_initialized, render_form, render_initial_scalar, render_value, to_assignment,
    validate_scalar, value_to_json, FormValue,
};
use crate::dimension::{
    flattened_length, referenced_parameters, resolve_dimensions, validate_dimensions, ArgumentScope,
    DimensionTracker, ParameterLookup,
};
use crate::config::StackConfig;
use crate::error::ValidationError;
use crate::stack::{CommandStep, StackedEntry};

// ============================================================================
// TEMPLATE PROVIDER
// ============================================================================

/// Source of previously used values when re-issuing or editing a command:
/// a command-history record or a stack entry.
pub trait TemplateProvider {
    /// Prior value of argument `name`, if the template has one
    fn assignment(&self, name: &str) -> Option<Value>;

    /// Prior value of extra option `id`
    fn option(&self, id: &str) -> Option<Value>;

    fn comment(&self) -> Option<String>;
}

// ============================================================================
// HIERARCHY
// ============================================================================

/// Command definitions ordered top-down: root base command first, `command` last
pub fn command_hierarchy(command: &Command) -> Vec<&Command> {
    let mut chain = Vec::new();
    let mut current = Some(command);
    while let Some(c) = current {
        chain.push(c);
        current = c.base_command.as_deref();
    }
    chain.reverse();
    chain
}

/// Most specific declaration of argument `name` in the hierarchy
pub fn find_argument<'a>(command: &'a Command, name: &str) -> Option<&'a Argument> {
    let mut current = Some(command);
    while let Some(c) = current {
        if let Some(argument) = c.argument.iter().find(|a| a.name == name) {
            return Some(argument);
        }
        current = c.base_command.as_deref();
    }
    None
}

/// Whether argument `name` is an aggregate or array
pub fn is_complex(command: &Command, name: &str) -> bool {
    find_argument(command, name)
        .map(|a| a.type_.is_aggregate() || a.type_.is_array())
        .unwrap_or(false)
}

// ============================================================================
// TREE
// ============================================================================

/// Editable arguments of a command, partitioned by whether they need input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentTree {
    /// Arguments that need user input
    pub arguments: Vec<Argument>,
    /// Arguments already satisfied by an initial or template value
    pub arguments_with_initial: Vec<Argument>,
    /// Fixed assignments collected across the hierarchy
    pub assignments: BTreeMap<String, String>,
}

impl ArgumentTree {
    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty() && self.arguments_with_initial.is_empty()
    }

    /// All editable arguments: those needing input first
    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().chain(self.arguments_with_initial.iter())
    }

    pub fn has_initial(&self, name: &str) -> bool {
        self.arguments_with_initial.iter().any(|a| a.name == name)
    }

    /// Arguments shown in the form; with `collapse` set the already
    /// satisfied ones stay behind a disclosure
    pub fn visible(&self, collapse: bool) -> Vec<&Argument> {
        if collapse && !self.arguments.is_empty() {
            self.arguments.iter().collect()
        } else {
            self.iter().collect()
        }
    }
}

fn initial_as_rendered(argument: &Argument) -> Option<String> {
    argument
        .initial_value
        .as_deref()
        .map(|initial| render_initial_scalar(&argument.type_, initial))
}

fn is_satisfied(argument: &Argument, template: Option<&dyn TemplateProvider>) -> bool {
    if let Some(previous) = template.and_then(|t| t.assignment(&argument.name)) {
        return initial_as_rendered(argument).as_deref() == Some(render_value(&previous).as_str());
    }
    match argument.type_.kind() {
        EngKind::Aggregate | EngKind::Array(_) => {
            argument.initial_value.is_some()
                && is_fully_initialized(&argument.type_, argument.initial_value.as_deref(), None)
        }
        _ => argument.initial_value.is_some(),
    }
}

/// Build the argument tree of `command`.
///
/// A name declared again by a more specific command replaces the earlier
/// declaration, so each name appears once.
pub fn build_argument_tree(command: &Command, template: Option<&dyn TemplateProvider>) -> ArgumentTree {
    let mut tree = ArgumentTree::default();

    for c in command_hierarchy(command) {
        for argument in &c.argument {
            tree.arguments.retain(|a| a.name != argument.name);
            tree.arguments_with_initial.retain(|a| a.name != argument.name);
            if is_satisfied(argument, template) {
                tree.arguments_with_initial.push(argument.clone());
            } else {
                tree.arguments.push(argument.clone());
            }
        }
        for assignment in &c.argument_assignment {
            tree.assignments
                .insert(assignment.name.clone(), assignment.value.clone());
        }
    }

    let fixed = &tree.assignments;
    tree.arguments.retain(|a| !fixed.contains_key(&a.name));
    tree.arguments_with_initial
        .retain(|a| !fixed.contains_key(&a.name));

    debug!(
        command = %command.qualified_name,
        arguments = tree.arguments.len(),
        with_initial = tree.arguments_with_initial.len(),
        fixed = tree.assignments.len(),
        "Built argument tree"
    );
    tree
}

/// Replace numeric enumeration values by their label.
///
/// Stored stacks may carry the numeric value of an enumerated argument (for
/// example after a numeric argument became an enumeration). Values that are
/// already labels are left untouched.
pub fn normalize_enum_arguments(command: &Command, args: &mut JsonMap<String, JsonValue>) {
    for (name, value) in args.iter_mut() {
        let Some(argument) = find_argument(command, name) else {
            continue;
        };
        if argument.type_.kind() != EngKind::Enumeration {
            continue;
        }
        let text = match &*value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => n.to_string(),
            _ => continue,
        };
        let enums = &argument.type_.enum_value;
        if enums.iter().any(|e| e.label == text) {
            continue;
        }
        if let Some(e) = enums.iter().find(|e| e.value.to_string() == text) {
            *value = JsonValue::String(e.label.clone());
        }
    }
}

// ============================================================================
// FORM
// ============================================================================

/// Editable state of a command form
#[derive(Debug, Clone)]
pub struct ArgumentForm {
    tree: ArgumentTree,
    values: BTreeMap<String, FormValue>,
    dirty: HashSet<String>,
    trackers: HashMap<String, DimensionTracker>,
    comment: String,
    extra: BTreeMap<String, Value>,
    collapsed: bool,
}

impl ArgumentForm {
    /// Build the tree for `command` and initialize every control.
    ///
    /// Controls start from the template value, else the declared initial
    /// value, else empty. Extra options listed in `options` are taken from
    /// the template when present.
    pub fn new(command: &Command, template: Option<&dyn TemplateProvider>, options: &[CommandOption]) -> Self {
        let tree = build_argument_tree(command, template);
        let mut values = BTreeMap::new();
        for argument in tree.iter() {
            let supplied = template
                .and_then(|t| t.assignment(&argument.name))
                .map(|v| value_to_json(&v));
            values.insert(
                argument.name.clone(),
                render_form(&argument.type_, supplied.as_ref(), argument.initial_value.as_deref()),
            );
        }

        let mut extra = BTreeMap::new();
        if let Some(t) = template {
            for option in options {
                if let Some(v) = t.option(&option.id) {
                    extra.insert(option.id.clone(), v);
                }
            }
        }

        Self {
            tree,
            values,
            dirty: HashSet::new(),
            trackers: HashMap::new(),
            comment: template.and_then(|t| t.comment()).unwrap_or_default(),
            extra,
            collapsed: false,
        }
    }

    /// Form using the configured extra options and collapse setting
    pub fn from_config(command: &Command, template: Option<&dyn TemplateProvider>, config: &StackConfig) -> Self {
        let mut form = Self::new(command, template, &config.command_options);
        form.collapsed = config.collapse_initialized_arguments;
        form
    }

    /// Arguments currently shown
    pub fn visible_arguments(&self) -> Vec<&Argument> {
        self.tree.visible(self.collapsed)
    }

    /// Whether some satisfied arguments are hidden
    pub fn is_collapsed(&self) -> bool {
        self.visible_arguments().len() < self.tree.iter().count()
    }

    pub fn show_all(&mut self) {
        self.collapsed = false;
    }

    pub fn tree(&self) -> &ArgumentTree {
        &self.tree
    }

    pub fn value(&self, name: &str) -> Option<&FormValue> {
        self.values.get(name)
    }

    /// Replace the value of argument `name` as a user edit
    pub fn set_value(&mut self, name: &str, value: FormValue) {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            self.dirty.insert(name.to_string());
        }
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.dirty.contains(name)
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    pub fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    pub fn set_extra(&mut self, id: impl Into<String>, value: Value) {
        self.extra.insert(id.into(), value);
    }

    /// Snapshot of the top-level scalar controls, for dimension lookup
    pub fn scope(&self) -> ArgumentScope<'static> {
        let mut scope = ArgumentScope::root();
        for argument in self.tree.iter() {
            if let Some(FormValue::Scalar(text)) = self.values.get(&argument.name) {
                let valid = validate_scalar(&argument.type_, text).is_empty();
                scope.insert(argument.name.clone(), text.clone(), valid);
            }
        }
        scope
    }

    /// Live parameters any array dimension in the form depends on
    pub fn referenced_parameters(&self) -> Vec<String> {
        let mut names = Vec::new();
        for argument in self.tree.iter() {
            for name in referenced_parameters(&argument.type_) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Resize array controls to their current dimensions.
    ///
    /// Call after every form edit and every live-feed push. Returns whether
    /// any entry list was rebuilt.
    pub fn refresh_dimensions(&mut self, params: &dyn ParameterLookup) -> bool {
        let scope = self.scope();
        let mut changed = false;
        for argument in self.tree.arguments.iter().chain(self.tree.arguments_with_initial.iter()) {
            if let Some(value) = self.values.get_mut(&argument.name) {
                changed |= refresh_value(
                    &argument.name,
                    &argument.type_,
                    value,
                    &scope,
                    params,
                    &mut self.trackers,
                );
            }
        }
        changed
    }

    /// Validation errors by control path (`arg`, `arg.member`, `arg[2]`).
    ///
    /// Only controls with errors are present; an empty map means the form
    /// may be submitted.
    pub fn validate(&self, params: &dyn ParameterLookup) -> BTreeMap<String, Vec<ValidationError>> {
        let scope = self.scope();
        let mut errors = BTreeMap::new();
        for argument in self.tree.iter() {
            if let Some(value) = self.values.get(&argument.name) {
                validate_value(&argument.name, &argument.type_, value, &scope, params, &mut errors);
            }
        }
        errors
    }

    /// Argument map for the command-issue request.
    ///
    /// Scalars that were satisfied up front and not edited are omitted so
    /// the backend applies its own initial value.
    pub fn assignments(&self) -> JsonMap<String, JsonValue> {
        let mut result = JsonMap::new();
        for argument in self.tree.iter() {
            let Some(value) = self.values.get(&argument.name) else {
                continue;
            };
            let complex = argument.type_.is_aggregate() || argument.type_.is_array();
            if complex || !self.tree.has_initial(&argument.name) || self.is_dirty(&argument.name) {
                result.insert(argument.name.clone(), to_assignment(&argument.type_, value));
            }
        }
        result
    }

    /// Stack entry issuing `command` with the current form state.
    ///
    /// The command is stored under its alias in `preferred_namespace` when
    /// it has one, else under its qualified name.
    pub fn to_entry(&self, command: &Command, preferred_namespace: Option<&str>) -> StackedEntry {
        let mut step = CommandStep::for_command(command, preferred_namespace);
        step.args = self.assignments();
        step.extra = self
            .extra
            .iter()
            .map(|(id, value)| (id.clone(), value_to_json(value)))
            .collect();
        let entry = StackedEntry::command(step);
        if self.comment.is_empty() {
            entry
        } else {
            entry.with_comment(self.comment.clone())
        }
    }
}

fn member_scope<'a>(
    type_: &ArgumentType,
    members: &BTreeMap<String, FormValue>,
    parent: &'a ArgumentScope<'a>,
) -> ArgumentScope<'a> {
    let mut scope = parent.child();
    for member in &type_.member {
        if let Some(FormValue::Scalar(text)) = members.get(&member.name) {
            let valid = validate_scalar(&member.type_, text).is_empty();
            scope.insert(member.name.clone(), text.clone(), valid);
        }
    }
    scope
}

fn refresh_value(
    path: &str,
    type_: &ArgumentType,
    value: &mut FormValue,
    scope: &ArgumentScope<'_>,
    params: &dyn ParameterLookup,
    trackers: &mut HashMap<String, DimensionTracker>,
) -> bool {
    let mut changed = false;
    match value {
        FormValue::Aggregate(members) => {
            let inner = member_scope(type_, members, scope);
            for member in &type_.member {
                if let Some(member_value) = members.get_mut(&member.name) {
                    let member_path = format!("{path}.{}", member.name);
                    changed |= refresh_value(&member_path, &member.type_, member_value, &inner, params, trackers);
                }
            }
        }
        FormValue::Array(entries) if type_.is_array() => {
            let tracker = trackers
                .entry(path.to_string())
                .or_insert_with(|| DimensionTracker::new(type_.clone()));
            changed |= tracker.apply(entries, scope, params);
            if let Some(element) = &type_.element_type {
                for (idx, entry) in entries.iter_mut().enumerate() {
                    let entry_path = format!("{path}[{idx}]");
                    changed |= refresh_value(&entry_path, element, entry, scope, params, trackers);
                }
            }
        }
        _ => {}
    }
    changed
}

fn validate_value(
    path: &str,
    type_: &ArgumentType,
    value: &FormValue,
    scope: &ArgumentScope<'_>,
    params: &dyn ParameterLookup,
    errors: &mut BTreeMap<String, Vec<ValidationError>>,
) {
    match value {
        FormValue::Scalar(text) => {
            let found = validate_scalar(type_, text);
            if !found.is_empty() {
                errors.insert(path.to_string(), found);
            }
        }
        FormValue::Aggregate(members) => {
            let inner = member_scope(type_, members, scope);
            for member in &type_.member {
                if let Some(member_value) = members.get(&member.name) {
                    validate_value(&format!("{path}.{}", member.name), &member.type_, member_value, &inner, params, errors);
                }
            }
        }
        FormValue::Array(entries) => {
            let mut found: Vec<ValidationError> = validate_dimensions(type_, scope, params)
                .into_iter()
                .map(ValidationError::from)
                .collect();
            if found.is_empty() && !type_.dimensions.is_empty() {
                let expected = flattened_length(&resolve_dimensions(type_, scope, params));
                if entries.len() != expected {
                    found.push(ValidationError::EntryCount {
                        expected,
                        found: entries.len(),
                    });
                }
            }
            if !found.is_empty() {
                errors.insert(path.to_string(), found);
            }
            if let Some(element) = &type_.element_type {
                for (idx, entry) in entries.iter().enumerate() {
                    validate_value(&format!("{path}[{idx}]"), element, entry, scope, params, errors);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdb_types::{
        ArgumentAssignment, ArgumentDimension, ArgumentMember, CommandOptionType, EnumValue,
        NamedObjectId, ParameterValue,
    };
    use crate::stack::Step;
    use serde_json::json;

    struct Template(BTreeMap<String, Value>);

    impl TemplateProvider for Template {
        fn assignment(&self, name: &str) -> Option<Value> {
            self.0.get(name).cloned()
        }

        fn option(&self, id: &str) -> Option<Value> {
            (id == "cop1Bypass").then_some(Value::Boolean(true))
        }

        fn comment(&self) -> Option<String> {
            Some("from history".into())
        }
    }

    fn names(args: &[Argument]) -> Vec<&str> {
        args.iter().map(|a| a.name.as_str()).collect()
    }

    fn names_of(args: Vec<&Argument>) -> Vec<&str> {
        args.into_iter().map(|a| a.name.as_str()).collect()
    }

    fn base_and_cmd() -> Command {
        let mut base = Command::new("/YSS/BASE");
        base.is_abstract = true;
        base.argument = vec![Argument::new("mode", ArgumentType::of("string")).with_initial("A")];

        let mut cmd = Command::new("/YSS/CMD");
        cmd.base_command = Some(Box::new(base));
        cmd.argument = vec![Argument::new("value", ArgumentType::of("integer"))];
        cmd.argument_assignment = vec![ArgumentAssignment {
            name: "mode".into(),
            value: "B".into(),
        }];
        cmd
    }

    #[test]
    fn fixed_assignment_excludes_inherited_argument() {
        let tree = build_argument_tree(&base_and_cmd(), None);
        assert_eq!(names(&tree.arguments), vec!["value"]);
        assert!(tree.arguments_with_initial.is_empty());
        assert_eq!(tree.assignments.get("mode").map(String::as_str), Some("B"));
    }

    #[test]
    fn hierarchy_is_top_down() {
        let cmd = base_and_cmd();
        let chain: Vec<&str> = command_hierarchy(&cmd)
            .iter()
            .map(|c| c.qualified_name.as_str())
            .collect();
        assert_eq!(chain, vec!["/YSS/BASE", "/YSS/CMD"]);
    }

    #[test]
    fn template_value_matching_initial_is_satisfied() {
        let mut cmd = Command::new("/YSS/SET");
        cmd.argument = vec![
            Argument::new("a", ArgumentType::of("integer")).with_initial("5"),
            Argument::new("b", ArgumentType::of("integer")).with_initial("5"),
        ];
        let template = Template(BTreeMap::from([
            ("a".to_string(), Value::Sint32(5)),
            ("b".to_string(), Value::Sint32(6)),
        ]));
        let tree = build_argument_tree(&cmd, Some(&template));
        assert_eq!(names(&tree.arguments), vec!["b"]);
        assert_eq!(names(&tree.arguments_with_initial), vec!["a"]);
    }

    #[test]
    fn boolean_template_compares_through_true_literal() {
        let mut t = ArgumentType::of("boolean");
        t.one_string_value = Some("ON".into());
        let mut cmd = Command::new("/YSS/PWR");
        cmd.argument = vec![Argument::new("on", t).with_initial("ON")];
        let template = Template(BTreeMap::from([("on".to_string(), Value::Boolean(true))]));
        let tree = build_argument_tree(&cmd, Some(&template));
        assert_eq!(names(&tree.arguments_with_initial), vec!["on"]);
    }

    #[test]
    fn redeclared_argument_comes_from_most_specific_command() {
        let mut base = Command::new("/B");
        base.argument = vec![
            Argument::new("x", ArgumentType::of("integer")),
            Argument::new("y", ArgumentType::of("integer")),
        ];
        let mut cmd = Command::new("/C");
        cmd.base_command = Some(Box::new(base));
        cmd.argument = vec![Argument::new("x", ArgumentType::of("integer")).with_initial("3")];

        let tree = build_argument_tree(&cmd, None);
        assert_eq!(names(&tree.arguments), vec!["y"]);
        assert_eq!(names(&tree.arguments_with_initial), vec!["x"]);
    }

    #[test]
    fn aggregate_needs_every_member_initialized() {
        let agg = ArgumentType::aggregate(vec![
            ArgumentMember {
                name: "p".into(),
                type_: ArgumentType::of("integer"),
                initial_value: None,
            },
            ArgumentMember {
                name: "q".into(),
                type_: ArgumentType::of("integer"),
                initial_value: None,
            },
        ]);
        let mut cmd = Command::new("/AGG");
        cmd.argument = vec![
            Argument::new("full", agg.clone()).with_initial(r#"{"p": 1, "q": 2}"#),
            Argument::new("partial", agg.clone()).with_initial(r#"{"p": 1}"#),
            Argument::new("none", agg),
        ];
        let tree = build_argument_tree(&cmd, None);
        assert_eq!(names(&tree.arguments), vec!["partial", "none"]);
        assert_eq!(names(&tree.arguments_with_initial), vec!["full"]);
    }

    #[test]
    fn enum_numeric_values_become_labels() {
        let mut t = ArgumentType::of("enumeration");
        t.enum_value = vec![
            EnumValue {
                value: 0,
                label: "OFF".into(),
            },
            EnumValue {
                value: 1,
                label: "ON".into(),
            },
        ];
        let mut cmd = Command::new("/SW");
        cmd.argument = vec![
            Argument::new("state", t),
            Argument::new("count", ArgumentType::of("integer")),
        ];
        let mut args: JsonMap<String, JsonValue> = [
            ("state".to_string(), json!("1")),
            ("count".to_string(), json!("1")),
        ]
        .into_iter()
        .collect();
        normalize_enum_arguments(&cmd, &mut args);
        assert_eq!(args["state"], json!("ON"));
        assert_eq!(args["count"], json!("1"));

        let mut numeric: JsonMap<String, JsonValue> = [("state".to_string(), json!(0))].into_iter().collect();
        normalize_enum_arguments(&cmd, &mut numeric);
        assert_eq!(numeric["state"], json!("OFF"));
    }

    #[test]
    fn form_omits_untouched_initialized_scalars() {
        let mut cmd = Command::new("/YSS/SET");
        cmd.argument = vec![
            Argument::new("gain", ArgumentType::of("float")).with_initial("1.0"),
            Argument::new("enable", ArgumentType::of("boolean")),
        ];
        let mut form = ArgumentForm::new(&cmd, None, &[]);
        form.set_value("enable", FormValue::Scalar("true".into()));

        let request = form.assignments();
        assert_eq!(request.get("enable"), Some(&json!(true)));
        assert!(!request.contains_key("gain"));

        form.set_value("gain", FormValue::Scalar("2.5".into()));
        assert_eq!(form.assignments().get("gain"), Some(&json!("2.5")));
    }

    #[test]
    fn form_takes_template_values_and_options() {
        let mut cmd = Command::new("/YSS/SET");
        cmd.argument = vec![Argument::new("level", ArgumentType::of("integer"))];
        let template = Template(BTreeMap::from([("level".to_string(), Value::Uint32(4))]));
        let options = vec![CommandOption {
            id: "cop1Bypass".into(),
            type_: CommandOptionType::Boolean,
            verbose_name: None,
        }];
        let form = ArgumentForm::new(&cmd, Some(&template), &options);
        assert_eq!(form.value("level"), Some(&FormValue::Scalar("4".into())));
        assert_eq!(form.comment(), "from history");
        assert_eq!(form.extra().get("cop1Bypass"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn configured_form_collapses_and_builds_entry() {
        let mut cmd = Command::new("/YSS/SET");
        cmd.alias = vec![NamedObjectId::aliased("MDB:OPS Name", "SET")];
        cmd.argument = vec![
            Argument::new("level", ArgumentType::of("integer")),
            Argument::new("gain", ArgumentType::of("float")).with_initial("1.0"),
        ];
        let config = StackConfig {
            preferred_namespace: Some("MDB:OPS Name".into()),
            command_options: vec![CommandOption {
                id: "cop1Bypass".into(),
                type_: CommandOptionType::Boolean,
                verbose_name: None,
            }],
            ..StackConfig::default()
        };
        let template = Template(BTreeMap::from([("level".to_string(), Value::Uint32(4))]));

        let mut form = ArgumentForm::from_config(&cmd, Some(&template), &config);
        assert!(form.is_collapsed());
        assert_eq!(names_of(form.visible_arguments()), vec!["level"]);
        form.show_all();
        assert!(!form.is_collapsed());
        assert_eq!(names_of(form.visible_arguments()), vec!["level", "gain"]);

        let entry = form.to_entry(&cmd, config.preferred_namespace.as_deref());
        assert_eq!(entry.comment.as_deref(), Some("from history"));
        let Step::Command(step) = &entry.step else {
            panic!("expected command");
        };
        assert_eq!(step.command_id(), NamedObjectId::aliased("MDB:OPS Name", "SET"));
        assert_eq!(step.args.get("level"), Some(&json!("4")));
        assert!(!step.args.contains_key("gain"));
        assert_eq!(step.extra.get("cop1Bypass"), Some(&json!(true)));
    }

    #[test]
    fn nothing_is_hidden_when_every_argument_is_satisfied() {
        let mut cmd = Command::new("/YSS/NOOP");
        cmd.argument = vec![Argument::new("mode", ArgumentType::of("string")).with_initial("A")];
        let form = ArgumentForm::from_config(&cmd, None, &StackConfig::default());
        assert!(!form.is_collapsed());
        assert_eq!(names_of(form.visible_arguments()), vec!["mode"]);
    }

    #[test]
    fn array_follows_sibling_argument() {
        let mut cmd = Command::new("/YSS/UPLOAD");
        cmd.argument = vec![
            Argument::new("n", ArgumentType::of("integer")),
            Argument::new(
                "data",
                ArgumentType::array(
                    ArgumentType::of("integer"),
                    vec![ArgumentDimension::from_argument("n", 1, 0)],
                ),
            ),
        ];
        let params: HashMap<String, ParameterValue> = HashMap::new();
        let mut form = ArgumentForm::new(&cmd, None, &[]);

        form.refresh_dimensions(&params);
        assert_eq!(form.value("data"), Some(&FormValue::Array(vec![])));
        let errors = form.validate(&params);
        assert!(errors.contains_key("data"));
        assert!(errors.contains_key("n"));

        form.set_value("n", FormValue::Scalar("2".into()));
        assert!(form.refresh_dimensions(&params));
        assert!(!form.refresh_dimensions(&params));
        let Some(FormValue::Array(entries)) = form.value("data") else {
            panic!("expected array control");
        };
        assert_eq!(entries.len(), 2);

        form.set_value(
            "data",
            FormValue::Array(vec![FormValue::Scalar("7".into()), FormValue::Scalar("8".into())]),
        );
        assert!(form.validate(&params).is_empty());
        assert_eq!(form.assignments().get("data"), Some(&json!(["7", "8"])));
    }

    #[test]
    fn replaced_array_is_held_to_its_dimensions() {
        let mut cmd = Command::new("/YSS/UPLOAD");
        cmd.argument = vec![
            Argument::new("n", ArgumentType::of("integer")),
            Argument::new(
                "data",
                ArgumentType::array(
                    ArgumentType::of("integer"),
                    vec![ArgumentDimension::from_argument("n", 1, 0)],
                ),
            ),
        ];
        let params: HashMap<String, ParameterValue> = HashMap::new();
        let mut form = ArgumentForm::new(&cmd, None, &[]);
        form.set_value("n", FormValue::Scalar("2".into()));
        form.refresh_dimensions(&params);

        let five = FormValue::Array(
            ["1", "2", "3", "4", "5"]
                .iter()
                .map(|v| FormValue::Scalar(v.to_string()))
                .collect(),
        );
        form.set_value("data", five);
        assert_eq!(
            form.validate(&params)["data"],
            vec![ValidationError::EntryCount { expected: 2, found: 5 }]
        );

        assert!(form.refresh_dimensions(&params));
        assert!(form.validate(&params).is_empty());
        assert_eq!(form.assignments().get("data"), Some(&json!(["1", "2"])));
    }

    #[test]
    fn array_in_aggregate_reads_member_then_form_scope() {
        let agg = ArgumentType::aggregate(vec![
            ArgumentMember {
                name: "len".into(),
                type_: ArgumentType::of("integer"),
                initial_value: Some("3".into()),
            },
            ArgumentMember {
                name: "items".into(),
                type_: ArgumentType::array(
                    ArgumentType::of("integer"),
                    vec![
                        ArgumentDimension::from_argument("len", 1, 0),
                        ArgumentDimension::from_argument("width", 1, 0),
                    ],
                ),
                initial_value: None,
            },
        ]);
        let mut cmd = Command::new("/YSS/TABLE");
        cmd.argument = vec![
            Argument::new("width", ArgumentType::of("integer")).with_initial("2"),
            Argument::new("table", agg),
        ];
        let params: HashMap<String, ParameterValue> = HashMap::new();
        let mut form = ArgumentForm::new(&cmd, None, &[]);
        form.refresh_dimensions(&params);

        let Some(FormValue::Aggregate(members)) = form.value("table") else {
            panic!("expected aggregate control");
        };
        let Some(FormValue::Array(items)) = members.get("items") else {
            panic!("expected array member");
        };
        assert_eq!(items.len(), 6);
    }
}
