//! Error types for the body model.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while building or querying a body model.
#[derive(Debug, Error)]
pub enum BodyError {
    /// A body description or configuration document could not be read at all
    #[error("Config parse error in [{section}] {key}: {reason}")]
    ConfigParse {
        section: String,
        key: String,
        reason: String,
    },

    /// A marker label expected by the skeleton is absent from the capture
    #[error("Missing marker: {0}")]
    MissingMarker(String),

    /// Query time falls outside the open trajectory time range
    #[error("Query time {time} outside trajectory range ({min}, {max})")]
    TemporalRange { time: f64, min: f64, max: f64 },

    /// A direction vector had (numerically) zero length
    #[error("Degenerate vector: {0}")]
    DegenerateVector(String),

    /// Operation called in a lifecycle state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Array dimensions disagree
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Unknown marker: {0}")]
    UnknownMarker(u32),

    #[error("Unknown cylinder: {0}")]
    UnknownCylinder(u32),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BodyError {
    /// Creates a degenerate-vector error.
    pub fn degenerate(what: impl Into<String>) -> Self {
        Self::DegenerateVector(what.into())
    }

    /// Creates an invalid-state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Creates a shape-mismatch error.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }
}

pub type BodyResult<T> = Result<T, BodyError>;

/// A recoverable problem found while validating a description entry.
///
/// The offending entry is skipped; the rest of the document still loads.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigWarning {
    pub section: String,
    pub key: String,
    pub reason: String,
}

impl ConfigWarning {
    pub fn new(section: &str, key: &str, reason: impl Into<String>) -> Self {
        Self {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.section, self.key, self.reason)
    }
}

impl From<ConfigWarning> for BodyError {
    fn from(w: ConfigWarning) -> Self {
        BodyError::ConfigParse {
            section: w.section,
            key: w.key,
            reason: w.reason,
        }
    }
}

/// A successfully parsed value together with the entries that were skipped.
#[derive(Debug, Clone)]
pub struct Validated<T> {
    pub value: T,
    pub warnings: Vec<ConfigWarning>,
}

impl<T> Validated<T> {
    pub fn new(value: T, warnings: Vec<ConfigWarning>) -> Self {
        Self { value, warnings }
    }

    /// Returns true if nothing was skipped.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_converts_to_config_parse() {
        let w = ConfigWarning::new("cylinder", "3", "unknown head marker 42");
        assert_eq!(w.to_string(), "[cylinder] 3: unknown head marker 42");

        let err: BodyError = w.into();
        assert!(matches!(err, BodyError::ConfigParse { ref section, .. } if section == "cylinder"));
    }

    #[test]
    fn test_temporal_range_message() {
        let err = BodyError::TemporalRange { time: 12.0, min: 0.0, max: 10.0 };
        assert_eq!(
            err.to_string(),
            "Query time 12 outside trajectory range (0, 10)"
        );
    }
}
