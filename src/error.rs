//! Error types for configuration validation and simulation faults

use thiserror::Error;

/// A single rejected configuration field.
#[derive(Debug, Clone, Error)]
#[error("`{field}`: {message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced before any trial executes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    /// All offending fields are collected and reported together.
    #[error("invalid configuration: {}", join_fields(.0))]
    Invalid(Vec<FieldError>),
}

/// Fatal faults inside a running trial. These indicate an engine or policy
/// contract bug and abort the current trial only; other trials still complete.
#[derive(Debug, Clone, Error)]
pub enum SimError {
    #[error("internal consistency violation at t={timestamp:.3}s while processing {event}: {message}")]
    InternalConsistency {
        timestamp: f64,
        event: String,
        message: String,
    },
}
