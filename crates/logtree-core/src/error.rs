//! Error types for logtree

use thiserror::Error;

/// Main error type for logtree operations
#[derive(Error, Debug)]
pub enum LogTreeError {
    /// DN contains an empty segment (eg. `foo..bar`, `.foo` or `foo.`)
    #[error("Invalid DN: {0:?}")]
    InvalidDn(String),

    /// Read was asked for entries that are both raw-only and leveled-only
    #[error("Cannot return logs that are simultaneously raw-only and leveled-only")]
    ConflictingQueryOptions,

    /// Severity string is not one of the known levels
    #[error("Invalid severity: {0:?}")]
    InvalidSeverity(String),

    /// Source location is not of the form `file:line`
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// Wire representation of an entry could not be turned into a LogEntry
    #[error("Malformed entry: {0}")]
    MalformedEntry(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using LogTreeError
pub type LogTreeResult<T> = Result<T, LogTreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LogTreeError::InvalidDn("a..b".to_string());
        assert_eq!(format!("{}", err), "Invalid DN: \"a..b\"");

        let err = LogTreeError::ConflictingQueryOptions;
        assert!(format!("{}", err).contains("raw-only"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LogTreeError = io_err.into();
        assert!(matches!(err, LogTreeError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: LogTreeError = json_err.into();
        assert!(matches!(err, LogTreeError::Serialization(_)));
    }
}
