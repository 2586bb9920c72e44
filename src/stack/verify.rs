//! Verification evaluator.
//!
//! A verify step holds a list of comparisons between a live parameter and a
//! literal. Every evaluation recomputes every comparison (no short-circuit)
//! and writes the outcome into a per-comparison status cell that observers
//! can watch while the runner keeps re-testing.

use mdb_types::{ParameterValue, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::codec::{render_json_scalar, render_value};
use crate::dimension::ParameterLookup;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Neq => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
        }
    }

    fn is_numeric(&self) -> bool {
        !matches!(self, Operator::Eq | Operator::Neq)
    }
}

/// `parameter <operator> value`; `value` is a JSON string or number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub parameter: String,
    pub operator: Operator,
    pub value: JsonValue,
}

impl Comparison {
    pub fn new(parameter: impl Into<String>, operator: Operator, value: impl Into<JsonValue>) -> Self {
        Self {
            parameter: parameter.into(),
            operator,
            value: value.into(),
        }
    }

    /// Whether the engineering value satisfies this comparison.
    ///
    /// Ordering operators need both sides to be numbers; anything else is
    /// unsatisfied.
    pub fn holds(&self, eng_value: &Value) -> bool {
        let actual = render_value(eng_value);
        let expected = render_json_scalar(&self.value);
        if !self.operator.is_numeric() {
            return match self.operator {
                Operator::Eq => actual == expected,
                _ => actual != expected,
            };
        }

        let (Some(a), Some(b)) = (parse_number(&actual), parse_number(&expected)) else {
            return false;
        };
        match self.operator {
            Operator::Lt => a < b,
            Operator::Lte => a <= b,
            Operator::Gt => a > b,
            Operator::Gte => a >= b,
            Operator::Eq | Operator::Neq => false,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.parameter,
            self.operator.symbol(),
            render_json_scalar(&self.value)
        )
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| !n.is_nan())
}

/// Outcome of one comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonStatus {
    Ok,
    Nok,
    Pending,
    Cancelled,
}

/// Shared, observable status of one comparison.
///
/// Clones share the same cell.
#[derive(Debug, Clone)]
pub struct StatusCell(Arc<watch::Sender<Option<ComparisonStatus>>>);

impl StatusCell {
    pub fn new(status: Option<ComparisonStatus>) -> Self {
        let (tx, _) = watch::channel(status);
        Self(Arc::new(tx))
    }

    pub fn get(&self) -> Option<ComparisonStatus> {
        *self.0.borrow()
    }

    pub fn set(&self, status: ComparisonStatus) {
        self.0.send_replace(Some(status));
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ComparisonStatus>> {
        self.0.subscribe()
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(None)
    }
}

/// A parameter with the value seen at the last evaluation
#[derive(Debug, Clone, Default)]
pub struct NamedParameterValue {
    pub parameter: String,
    pub pval: Option<ParameterValue>,
    pub status: StatusCell,
}

impl NamedParameterValue {
    pub fn new(parameter: impl Into<String>, pval: Option<ParameterValue>) -> Self {
        Self {
            parameter: parameter.into(),
            pval,
            status: StatusCell::default(),
        }
    }
}

/// Evaluate `condition` against `pvals`, updating `cells` in place.
///
/// `cells` is rebuilt when it does not line up with `condition`, so
/// observers of an existing cell keep receiving updates across evaluations.
/// Returns true only when every comparison holds.
pub fn evaluate(
    condition: &[Comparison],
    pvals: &dyn ParameterLookup,
    cells: &mut Vec<NamedParameterValue>,
) -> bool {
    let aligned = cells.len() == condition.len()
        && cells
            .iter()
            .zip(condition)
            .all(|(cell, comparison)| cell.parameter == comparison.parameter);
    if !aligned {
        *cells = condition
            .iter()
            .map(|c| NamedParameterValue::new(c.parameter.clone(), None))
            .collect();
    }

    let mut result = true;
    for (comparison, cell) in condition.iter().zip(cells.iter_mut()) {
        let pval = pvals.latest_value(&comparison.parameter);
        cell.pval = pval.cloned();
        let satisfied = pval
            .and_then(|p| p.eng_value.as_ref())
            .map(|v| comparison.holds(v))
            .unwrap_or(false);
        if satisfied {
            cell.status.set(ComparisonStatus::Ok);
        } else {
            cell.status.set(ComparisonStatus::Pending);
            result = false;
        }
    }
    result
}

/// Turn every pending status into cancelled
pub fn cancel_pending(cells: &[NamedParameterValue]) {
    for cell in cells {
        if cell.status.get() == Some(ComparisonStatus::Pending) {
            cell.status.set(ComparisonStatus::Cancelled);
        }
    }
}
