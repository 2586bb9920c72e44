//! Error handling for the stack engine
//!
//! Validation problems are values, not failures: they are collected into
//! `Vec<ValidationError>` and shown next to the offending control. Only
//! document I/O and collaborator failures travel as `StackError`.

use thiserror::Error;

/// Main error type for the stack engine
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Inline validation errors reported against a single argument control.
///
/// These block submission, never rendering.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("A value is required")]
    Required,

    #[error("'{value}' is not a valid hexadecimal string")]
    InvalidHex { value: String },

    #[error("Expected at least {min} bytes, found {found}")]
    TooFewBytes { min: u32, found: usize },

    #[error("Expected at most {max} bytes, found {found}")]
    TooManyBytes { max: u32, found: usize },

    #[error("Expected at least {min} characters, found {found}")]
    TooFewChars { min: u32, found: usize },

    #[error("Expected at most {max} characters, found {found}")]
    TooManyChars { max: u32, found: usize },

    #[error("'{value}' is not a number")]
    NotANumber { value: String },

    #[error("'{value}' is not an integer")]
    NotAnInteger { value: String },

    #[error("Value must not be negative")]
    Unsigned,

    #[error("Value must be at least {min}")]
    BelowMinimum { min: f64 },

    #[error("Value must be at most {max}")]
    AboveMaximum { max: f64 },

    #[error("'{value}' is not one of the enumeration states")]
    UnknownEnumState { value: String },

    #[error("'{value}' is not a boolean")]
    NotABoolean { value: String },

    #[error("'{value}' is not an ISO 8601 timestamp")]
    InvalidTimestamp { value: String },

    #[error("Expected {expected} entries, found {found}")]
    EntryCount { expected: usize, found: usize },

    #[error("Dimension error: {0}")]
    Dimension(#[from] DimensionError),
}

/// Array dimension validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DimensionError {
    #[error("Dimension {index} depends on argument '{name}', which has no valid value")]
    MissingArgument { index: usize, name: String },

    #[error("Dimension {index} depends on parameter '{name}', which has no value")]
    MissingParameter { index: usize, name: String },

    #[error("Dimension {index} resolved to negative length {length}")]
    Negative { index: usize, length: i64 },
}

/// Stack document parsing errors
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Invalid stack JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid stack XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid XML attribute: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Missing attribute '{attribute}' on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("Unsupported stack format '{0}'")]
    UnsupportedFormat(String),

    #[error("Step {index} cannot be exported as XML: only command steps are supported")]
    XmlUnsupportedStep { index: usize },
}

/// Stack runner failures recorded on entries and returned to the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("Timeout has occurred")]
    Timeout,

    #[error("Command dispatch failed: {0}")]
    Dispatch(String),

    #[error("Acknowledgment {acknowledgment} reported {status}")]
    Rejected {
        acknowledgment: String,
        status: String,
    },

    #[error("Live feed closed")]
    FeedClosed,

    #[error("Run cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, StackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_error_converts_into_validation_error() {
        let err: ValidationError = DimensionError::MissingArgument {
            index: 0,
            name: "count".into(),
        }
        .into();
        assert!(err.to_string().contains("argument 'count'"));
    }

    #[test]
    fn runner_error_messages() {
        let err = RunnerError::Rejected {
            acknowledgment: "Acknowledge_Sent".into(),
            status: "NOK".into(),
        };
        assert_eq!(err.to_string(), "Acknowledgment Acknowledge_Sent reported NOK");
        assert_eq!(RunnerError::Timeout.to_string(), "Timeout has occurred");
    }
}
