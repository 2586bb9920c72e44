//! Dimension resolver for dynamically-sized array arguments.
//!
//! Each axis of an array type is described by an `ArgumentDimension`: a fixed
//! length, a reference to a sibling argument, or a reference to a live
//! parameter, the latter two passed through `n * slope + intercept`.
//!
//! Sibling values are passed in as an explicit `ArgumentScope` chain (nearest
//! control group first, ending at the top-level form) rather than discovered
//! by walking a mutable control tree. Live values come from any
//! `ParameterLookup`, normally the `LiveValueCache` snapshot.
//!
//! An array whose dimensions do not all resolve renders zero entries until
//! its dependencies resolve; the missing dependency is reported as a
//! validation error, not a failure.

use mdb_types::{ArgumentDimension, ArgumentType, ParameterValue};
use std::collections::{BTreeMap, HashMap};

use crate::codec::{render_form, value_to_number, FormValue};
use crate::error::DimensionError;

// ============================================================================
// CONTEXT
// ============================================================================

/// Current state of one sibling control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeField {
    pub value: String,
    pub valid: bool,
}

/// Read-only snapshot of the controls in one group, linked to its enclosing
/// group. The root scope is the top-level form.
#[derive(Debug, Default)]
pub struct ArgumentScope<'a> {
    fields: BTreeMap<String, ScopeField>,
    parent: Option<&'a ArgumentScope<'a>>,
}

impl<'a> ArgumentScope<'a> {
    /// Top-level form scope
    pub fn root() -> Self {
        Self::default()
    }

    /// Nested group scope (aggregate members) enclosed by `self`
    pub fn child(&'a self) -> ArgumentScope<'a> {
        ArgumentScope {
            fields: BTreeMap::new(),
            parent: Some(self),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>, valid: bool) -> Self {
        self.insert(name, value, valid);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>, valid: bool) {
        self.fields.insert(
            name.into(),
            ScopeField {
                value: value.into(),
                valid,
            },
        );
    }

    /// Nearest field named `name`, searching outward up to the top-level form
    pub fn lookup(&self, name: &str) -> Option<&ScopeField> {
        match self.fields.get(name) {
            Some(field) => Some(field),
            None => self.parent.and_then(|p| p.lookup(name)),
        }
    }
}

/// Source of the most recent value of each live parameter
pub trait ParameterLookup {
    fn latest_value(&self, qualified_name: &str) -> Option<&ParameterValue>;
}

impl ParameterLookup for HashMap<String, ParameterValue> {
    fn latest_value(&self, qualified_name: &str) -> Option<&ParameterValue> {
        self.get(qualified_name)
    }
}

impl ParameterLookup for BTreeMap<String, ParameterValue> {
    fn latest_value(&self, qualified_name: &str) -> Option<&ParameterValue> {
        self.get(qualified_name)
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

fn linear(n: f64, dimension: &ArgumentDimension) -> Option<i64> {
    let slope = dimension.slope.unwrap_or(1) as f64;
    let intercept = dimension.intercept.unwrap_or(0) as f64;
    let length = n * slope + intercept;
    if length.is_finite() && length.fract() == 0.0 {
        Some(length as i64)
    } else {
        None
    }
}

/// Resolve one axis; `None` means "unknown"
pub fn resolve_dimension(
    dimension: &ArgumentDimension,
    scope: &ArgumentScope<'_>,
    params: &dyn ParameterLookup,
) -> Option<i64> {
    if let Some(fixed) = dimension.fixed_value {
        return Some(fixed);
    }
    if let Some(name) = &dimension.argument {
        let field = scope.lookup(name)?;
        if !field.valid || field.value.trim().is_empty() {
            return None;
        }
        let n = field.value.trim().parse::<f64>().ok()?;
        return linear(n, dimension);
    }
    if let Some(parameter) = &dimension.parameter {
        let pval = params.latest_value(&parameter.qualified_name)?;
        let n = pval.eng_value.as_ref().and_then(value_to_number)?;
        return linear(n, dimension);
    }
    None
}

/// Per-axis lengths of an array type, in declaration order
pub fn resolve_dimensions(
    type_: &ArgumentType,
    scope: &ArgumentScope<'_>,
    params: &dyn ParameterLookup,
) -> Vec<Option<i64>> {
    type_
        .dimensions
        .iter()
        .map(|d| resolve_dimension(d, scope, params))
        .collect()
}

/// Number of entries an array renders: the product of its dimensions, or
/// zero when any dimension is unknown or negative
pub fn flattened_length(dimensions: &[Option<i64>]) -> usize {
    let mut product: usize = 1;
    for dimension in dimensions {
        match dimension {
            Some(n) if *n >= 0 => product = product.saturating_mul(*n as usize),
            _ => return 0,
        }
    }
    product
}

/// Validation errors for the dimensions of an array type
pub fn validate_dimensions(
    type_: &ArgumentType,
    scope: &ArgumentScope<'_>,
    params: &dyn ParameterLookup,
) -> Vec<DimensionError> {
    let mut errors = Vec::new();
    for (index, dimension) in type_.dimensions.iter().enumerate() {
        match resolve_dimension(dimension, scope, params) {
            Some(length) if length < 0 => errors.push(DimensionError::Negative { index, length }),
            Some(_) => {}
            None => {
                if let Some(name) = &dimension.argument {
                    errors.push(DimensionError::MissingArgument {
                        index,
                        name: name.clone(),
                    });
                } else if let Some(parameter) = &dimension.parameter {
                    errors.push(DimensionError::MissingParameter {
                        index,
                        name: parameter.qualified_name.clone(),
                    });
                }
            }
        }
    }
    errors
}

/// Qualified names of the live parameters an array type depends on
pub fn referenced_parameters(type_: &ArgumentType) -> Vec<String> {
    let mut names = Vec::new();
    collect_parameters(type_, &mut names);
    names
}

fn collect_parameters(type_: &ArgumentType, names: &mut Vec<String>) {
    for dimension in &type_.dimensions {
        if let Some(parameter) = &dimension.parameter {
            if !names.contains(&parameter.qualified_name) {
                names.push(parameter.qualified_name.clone());
            }
        }
    }
    if let Some(element) = &type_.element_type {
        collect_parameters(element, names);
    }
    for member in &type_.member {
        collect_parameters(&member.type_, names);
    }
}

/// Convert a flat entry index into per-axis indices (row-major)
pub fn unflatten_index(flat_index: usize, dimensions: &[usize]) -> Vec<usize> {
    if dimensions.is_empty() {
        return Vec::new();
    }
    let mut n = flat_index;
    let mut d: usize = dimensions[1..].iter().product();
    let mut result = Vec::with_capacity(dimensions.len());
    for k in 0..dimensions.len() - 1 {
        let idx = if d == 0 { 0 } else { n / d };
        result.push(idx);
        n -= d * idx;
        d = if dimensions[k + 1] == 0 { 0 } else { d / dimensions[k + 1] };
    }
    result.push(n);
    result
}

// ============================================================================
// TRACKER
// ============================================================================

/// Keeps the entry controls of one array argument in step with its
/// dimensions.
///
/// Call `refresh` on every form change and every live-feed push for a
/// referenced parameter. Entries are only rebuilt when the flattened length
/// actually changes.
#[derive(Debug, Clone)]
pub struct DimensionTracker {
    type_: ArgumentType,
    dimensions: Vec<Option<i64>>,
    length: Option<usize>,
}

impl DimensionTracker {
    pub fn new(type_: ArgumentType) -> Self {
        Self {
            type_,
            dimensions: Vec::new(),
            length: None,
        }
    }

    /// Last resolved per-axis lengths
    pub fn dimensions(&self) -> &[Option<i64>] {
        &self.dimensions
    }

    /// Last flattened length (0 before the first refresh)
    pub fn length(&self) -> usize {
        self.length.unwrap_or(0)
    }

    pub fn referenced_parameters(&self) -> Vec<String> {
        referenced_parameters(&self.type_)
    }

    /// Recompute dimensions; returns the new length only when it changed
    pub fn refresh(&mut self, scope: &ArgumentScope<'_>, params: &dyn ParameterLookup) -> Option<usize> {
        self.dimensions = resolve_dimensions(&self.type_, scope, params);
        let length = flattened_length(&self.dimensions);
        if self.length == Some(length) {
            return None;
        }
        self.length = Some(length);
        Some(length)
    }

    /// Refresh and resize `entries` to the flattened length.
    ///
    /// Existing entries are kept; new ones start from the element type's
    /// default form. Lists replaced from outside are brought back to the
    /// current length even when the dimensions did not change. Returns
    /// whether the entry list was rebuilt.
    pub fn apply(
        &mut self,
        entries: &mut Vec<FormValue>,
        scope: &ArgumentScope<'_>,
        params: &dyn ParameterLookup,
    ) -> bool {
        let length = self.refresh(scope, params).unwrap_or_else(|| self.length());
        if entries.len() == length {
            return false;
        }
        if entries.len() > length {
            entries.truncate(length);
        } else if let Some(element) = &self.type_.element_type {
            while entries.len() < length {
                entries.push(render_form(element, None, None));
            }
        } else {
            entries.resize(length, FormValue::empty_scalar());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdb_types::Value;
    use proptest::prelude::*;

    fn no_params() -> HashMap<String, ParameterValue> {
        HashMap::new()
    }

    fn params(name: &str, value: Value) -> HashMap<String, ParameterValue> {
        HashMap::from([(name.to_string(), ParameterValue::with_eng_value(value))])
    }

    #[test]
    fn parameter_dimension_applies_linear_transform() {
        let type_ = ArgumentType::array(
            ArgumentType::of("integer"),
            vec![ArgumentDimension::from_parameter("/SC/N", 2, 1)],
        );
        let live = params("/SC/N", Value::Uint32(3));
        let dims = resolve_dimensions(&type_, &ArgumentScope::root(), &live);
        assert_eq!(dims, vec![Some(7)]);
        assert_eq!(flattened_length(&dims), 7);
    }

    #[test]
    fn argument_dimension_reads_nearest_scope() {
        let root = ArgumentScope::root().with_field("count", "5", true);
        let mut group = root.child();
        group.insert("count", "2", true);
        let dim = ArgumentDimension::from_argument("count", 1, 0);

        assert_eq!(resolve_dimension(&dim, &group, &no_params()), Some(2));
        assert_eq!(resolve_dimension(&dim, &root, &no_params()), Some(5));

        let other = root.child().with_field("unrelated", "1", true);
        assert_eq!(resolve_dimension(&dim, &other, &no_params()), Some(5));
    }

    #[test]
    fn invalid_or_empty_argument_is_unknown() {
        let dim = ArgumentDimension::from_argument("count", 1, 0);
        let invalid = ArgumentScope::root().with_field("count", "4", false);
        let empty = ArgumentScope::root().with_field("count", " ", true);
        let garbage = ArgumentScope::root().with_field("count", "four", true);
        assert_eq!(resolve_dimension(&dim, &invalid, &no_params()), None);
        assert_eq!(resolve_dimension(&dim, &empty, &no_params()), None);
        assert_eq!(resolve_dimension(&dim, &garbage, &no_params()), None);
        assert_eq!(resolve_dimension(&dim, &ArgumentScope::root(), &no_params()), None);
    }

    #[test]
    fn unresolved_dimension_renders_no_entries_and_reports_name() {
        let type_ = ArgumentType::array(
            ArgumentType::of("float"),
            vec![
                ArgumentDimension::fixed(3),
                ArgumentDimension::from_parameter("/SC/M", 1, 0),
            ],
        );
        let scope = ArgumentScope::root();
        assert_eq!(flattened_length(&resolve_dimensions(&type_, &scope, &no_params())), 0);
        assert_eq!(
            validate_dimensions(&type_, &scope, &no_params()),
            vec![DimensionError::MissingParameter {
                index: 1,
                name: "/SC/M".into()
            }]
        );
    }

    #[test]
    fn negative_dimension_is_a_validation_error() {
        let type_ = ArgumentType::array(
            ArgumentType::of("float"),
            vec![ArgumentDimension::from_argument("n", 1, -3)],
        );
        let scope = ArgumentScope::root().with_field("n", "1", true);
        assert_eq!(
            validate_dimensions(&type_, &scope, &no_params()),
            vec![DimensionError::Negative { index: 0, length: -2 }]
        );
        assert_eq!(flattened_length(&resolve_dimensions(&type_, &scope, &no_params())), 0);
    }

    #[test]
    fn missing_descriptor_is_unknown() {
        let dim = ArgumentDimension::default();
        assert_eq!(resolve_dimension(&dim, &ArgumentScope::root(), &no_params()), None);
    }

    #[test]
    fn non_numeric_parameter_is_unknown() {
        let dim = ArgumentDimension::from_parameter("/SC/MODE", 1, 0);
        let live = params("/SC/MODE", Value::Enumerated("SAFE".into()));
        assert_eq!(resolve_dimension(&dim, &ArgumentScope::root(), &live), None);
    }

    #[test]
    fn tracker_rebuilds_only_on_length_change() {
        let type_ = ArgumentType::array(
            ArgumentType::of("integer"),
            vec![ArgumentDimension::from_parameter("/SC/N", 0, 2)],
        );
        let mut tracker = DimensionTracker::new(type_);
        let mut entries = Vec::new();

        let first = params("/SC/N", Value::Uint32(1));
        assert!(tracker.apply(&mut entries, &ArgumentScope::root(), &first));
        assert_eq!(entries.len(), 2);

        // slope 0: the source value moves but the derived length does not
        entries[0] = FormValue::Scalar("42".into());
        let second = params("/SC/N", Value::Uint32(9));
        assert!(!tracker.apply(&mut entries, &ArgumentScope::root(), &second));
        assert_eq!(entries[0], FormValue::Scalar("42".into()));
    }

    #[test]
    fn tracker_restores_length_of_replaced_list() {
        let type_ = ArgumentType::array(
            ArgumentType::of("integer"),
            vec![ArgumentDimension::fixed(3)],
        );
        let mut tracker = DimensionTracker::new(type_);
        let mut entries = Vec::new();
        let scope = ArgumentScope::root();
        assert!(tracker.apply(&mut entries, &scope, &no_params()));

        entries = vec![FormValue::Scalar("9".into())];
        assert!(tracker.apply(&mut entries, &scope, &no_params()));
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], FormValue::Scalar("9".into()));
        assert!(!tracker.apply(&mut entries, &scope, &no_params()));
    }

    #[test]
    fn tracker_keeps_existing_entries_when_growing() {
        let type_ = ArgumentType::array(
            ArgumentType::of("integer"),
            vec![ArgumentDimension::from_argument("n", 1, 0)],
        );
        let mut tracker = DimensionTracker::new(type_);
        let mut entries = vec![FormValue::Scalar("1".into())];
        let scope = ArgumentScope::root().with_field("n", "3", true);
        assert!(tracker.apply(&mut entries, &scope, &no_params()));
        assert_eq!(
            entries,
            vec![
                FormValue::Scalar("1".into()),
                FormValue::empty_scalar(),
                FormValue::empty_scalar()
            ]
        );
        assert_eq!(tracker.dimensions(), &[Some(3)]);
    }

    #[test]
    fn referenced_parameters_are_collected_recursively() {
        let inner = ArgumentType::array(
            ArgumentType::of("integer"),
            vec![ArgumentDimension::from_parameter("/B", 1, 0)],
        );
        let outer = ArgumentType::array(
            inner,
            vec![
                ArgumentDimension::from_parameter("/A", 1, 0),
                ArgumentDimension::from_parameter("/A", 2, 0),
            ],
        );
        assert_eq!(referenced_parameters(&outer), vec!["/A".to_string(), "/B".to_string()]);
    }

    #[test]
    fn unflatten_row_major() {
        assert_eq!(unflatten_index(5, &[2, 3]), vec![1, 2]);
        assert_eq!(unflatten_index(0, &[2, 3]), vec![0, 0]);
        assert_eq!(unflatten_index(4, &[5]), vec![4]);
        assert_eq!(unflatten_index(7, &[2, 2, 2]), vec![1, 1, 1]);
    }

    proptest! {
        #[test]
        fn flattened_length_is_product_of_resolved(dims in proptest::collection::vec(0i64..8, 1..4)) {
            let resolved: Vec<Option<i64>> = dims.iter().copied().map(Some).collect();
            let product: i64 = dims.iter().product();
            prop_assert_eq!(flattened_length(&resolved), product as usize);
        }

        #[test]
        fn any_unknown_dimension_yields_zero(
            dims in proptest::collection::vec(1i64..8, 1..4),
            hole in 0usize..4,
        ) {
            let mut resolved: Vec<Option<i64>> = dims.iter().copied().map(Some).collect();
            let idx = hole % resolved.len();
            resolved[idx] = None;
            prop_assert_eq!(flattened_length(&resolved), 0);
        }
    }
}
