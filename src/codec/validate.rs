//! Type-specific validators for scalar argument controls.
//!
//! Every validator is total: malformed input yields errors, never a panic.

use mdb_types::{ArgumentType, EngKind};
use tracing::warn;

use crate::error::ValidationError;

/// Validate the editable text of a scalar control against its type
pub fn validate_scalar(type_: &ArgumentType, text: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let kind = type_.kind();

    if text.is_empty() && kind != EngKind::String {
        errors.push(ValidationError::Required);
        return errors;
    }

    match kind {
        EngKind::Boolean => {
            if text != "true" && text != "false" {
                errors.push(ValidationError::NotABoolean {
                    value: text.to_string(),
                });
            }
        }
        EngKind::Binary => validate_hex(type_, text, &mut errors),
        EngKind::String => {
            let found = text.chars().count();
            if let Some(min) = type_.min_chars {
                if found < min as usize {
                    errors.push(ValidationError::TooFewChars { min, found });
                }
            }
            if let Some(max) = type_.max_chars {
                if found > max as usize {
                    errors.push(ValidationError::TooManyChars { max, found });
                }
            }
        }
        EngKind::Integer => match text.trim().parse::<i128>() {
            Ok(n) => {
                if type_.signed == Some(false) && n < 0 {
                    errors.push(ValidationError::Unsigned);
                }
                check_range(type_, n as f64, &mut errors);
            }
            Err(_) => errors.push(ValidationError::NotAnInteger {
                value: text.to_string(),
            }),
        },
        EngKind::Float => match text.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => check_range(type_, n, &mut errors),
            _ => errors.push(ValidationError::NotANumber {
                value: text.to_string(),
            }),
        },
        EngKind::Enumeration => {
            if !type_.enum_value.iter().any(|e| e.label == text) {
                errors.push(ValidationError::UnknownEnumState {
                    value: text.to_string(),
                });
            }
        }
        EngKind::Time => {
            if chrono::DateTime::parse_from_rfc3339(text).is_err() {
                errors.push(ValidationError::InvalidTimestamp {
                    value: text.to_string(),
                });
            }
        }
        EngKind::Aggregate | EngKind::Array(_) => {
            warn!(
                "Scalar validation requested for complex type '{}'",
                type_.eng_type
            );
        }
        EngKind::Unknown(eng_type) => {
            warn!("No validator for engType '{}', accepting input", eng_type);
        }
    }

    errors
}

fn validate_hex(type_: &ArgumentType, text: &str, errors: &mut Vec<ValidationError>) {
    if !text.chars().all(|c| c.is_ascii_hexdigit()) {
        errors.push(ValidationError::InvalidHex {
            value: text.to_string(),
        });
        return;
    }
    let found = text.len().div_ceil(2);
    if let Some(min) = type_.min_bytes {
        if found < min as usize {
            errors.push(ValidationError::TooFewBytes { min, found });
        }
    }
    if let Some(max) = type_.max_bytes {
        if found > max as usize {
            errors.push(ValidationError::TooManyBytes { max, found });
        }
    }
}

fn check_range(type_: &ArgumentType, n: f64, errors: &mut Vec<ValidationError>) {
    if let Some(min) = type_.range_min {
        if n < min {
            errors.push(ValidationError::BelowMinimum { min });
        }
    }
    if let Some(max) = type_.range_max {
        if n > max {
            errors.push(ValidationError::AboveMaximum { max });
        }
    }
}
