//! Error types for the aggregator.
//!
//! Uses `thiserror` for the two conditions a record can raise while it is
//! being tallied. Neither one halts a pipeline.

use std::fmt;

/// A raw record could not be decoded into an event.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The record is not valid JSON.
    #[error("invalid JSON record: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The record is valid JSON but not an object.
    #[error("record is not a JSON object (found {found})")]
    NotAnObject {
        /// JSON kind that was found instead.
        found: &'static str,
    },

    /// The `type` attribute is present but neither a string nor null.
    #[error("`type` must be a string (found {found})")]
    InvalidType {
        /// JSON kind that was found instead.
        found: &'static str,
    },
}

/// A counter reached its bound and was saturated instead of incremented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowWarning {
    /// Event type whose counter saturated.
    pub kind: String,
    /// The bound the counter is pinned at.
    pub max_count: u64,
}

impl fmt::Display for OverflowWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "count for '{}' saturated at {}",
            self.kind, self.max_count
        )
    }
}

/// The pipeline stopped accepting records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("pipeline is closed")]
pub struct PipelineClosed;

/// Name of a JSON value's kind, for error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
