//! Error types for the tick alignment engine.

use thiserror::Error;

use crate::types::TimestampSec;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Where in a sequence or table an error was detected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// Row (or record) index, zero-based.
    pub row: Option<usize>,
    /// Timestamp of the row, when it has one.
    pub timestamp: Option<TimestampSec>,
    /// Column or field name.
    pub column: Option<String>,
}

impl Location {
    pub fn row(row: usize) -> Self {
        Self {
            row: Some(row),
            ..Self::default()
        }
    }

    pub fn at(mut self, timestamp: TimestampSec) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(row) = self.row {
            parts.push(format!("row {row}"));
        }
        if let Some(ts) = self.timestamp {
            parts.push(format!("timestamp {ts}"));
        }
        if let Some(column) = &self.column {
            parts.push(format!("column '{column}'"));
        }
        if parts.is_empty() {
            write!(f, "<dataset>")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Main error type for the tick alignment engine.
///
/// Every variant is terminal for the batch being processed.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or out-of-order raw input.
    #[error("Input error at {location}: {message}")]
    Input { location: Location, message: String },

    /// Compound-field shape mismatch or column collision.
    #[error("Schema error at {location}: {message}")]
    Schema { location: Location, message: String },

    /// Post-merge invariant violation.
    #[error("Validation error at {location}: {message}")]
    Validation { location: Location, message: String },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an input error.
    pub fn input(location: Location, msg: impl Into<String>) -> Self {
        Error::Input {
            location,
            message: msg.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(location: Location, msg: impl Into<String>) -> Self {
        Error::Schema {
            location,
            message: msg.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(location: Location, msg: impl Into<String>) -> Self {
        Error::Validation {
            location,
            message: msg.into(),
        }
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Error::Database(msg.into())
    }

    /// Location of the failure, for the three data-level kinds.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Error::Input { location, .. }
            | Error::Schema { location, .. }
            | Error::Validation { location, .. } => Some(location),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_row_and_column() {
        let err = Error::validation(Location::row(3).at(1_700_000_004).column("spread"), "empty cell");
        let msg = err.to_string();
        assert!(msg.contains("row 3"));
        assert!(msg.contains("timestamp 1700000004"));
        assert!(msg.contains("column 'spread'"));
        assert!(msg.contains("empty cell"));
    }

    #[test]
    fn test_location_only_for_data_errors() {
        assert!(Error::config("bad").location().is_none());
        let err = Error::input(Location::row(0), "out of order");
        assert_eq!(err.location().and_then(|l| l.row), Some(0));
    }

    #[test]
    fn test_empty_location_display() {
        let err = Error::schema(Location::default(), "collision");
        assert_eq!(err.to_string(), "Schema error at <dataset>: collision");
    }
}
