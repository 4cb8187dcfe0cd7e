//! Error types for the RestGate query engine

use thiserror::Error;

/// Engine error types
#[derive(Error, Debug)]
pub enum Error {
    // Input validation errors
    #[error("Invalid query parameter: {0}")]
    InvalidQueryParam(String),

    #[error("{0}")]
    InvalidFilter(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Unknown column in on_conflict: {0}")]
    UnknownConflictColumn(String),

    #[error("Empty array provided")]
    EmptyBatch,

    #[error("Cannot perform upsert on table {0}: no primary key or unique constraint")]
    MissingConflictTarget(String),

    #[error("{0} requires at least one filter")]
    MissingFilter(&'static str),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    // Lookup errors
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Resource not found")]
    ResourceNotFound,

    // Execution errors
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for the OR-group format error
    pub fn invalid_or_format(segment: &str) -> Self {
        Self::InvalidFilter(format!("invalid OR filter format: {segment}"))
    }

    /// Shorthand for the AND-group format error
    pub fn invalid_and_format(segment: &str) -> Self {
        Self::InvalidFilter(format!("invalid AND filter format: {segment}"))
    }

    /// HTTP status code for each error type
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidQueryParam(_)
            | Self::InvalidFilter(_)
            | Self::UnknownColumn(_)
            | Self::UnknownConflictColumn(_)
            | Self::EmptyBatch
            | Self::MissingConflictTarget(_)
            | Self::MissingFilter(_)
            | Self::InvalidIdentifier(_)
            | Self::InvalidBody(_)
            | Self::ValidationError(_)
            | Self::JsonError(_) => 400,

            // 404 Not Found
            Self::TableNotFound(_) | Self::ResourceNotFound => 404,

            // 500 Internal Server Error
            Self::DatabaseError(_)
            | Self::DecodeError(_)
            | Self::ConfigError(_)
            | Self::InternalError(_)
            | Self::IoError(_) => 500,
        }
    }

    /// Error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidQueryParam(_) => "invalid_param",
            Self::InvalidFilter(_) => "invalid_filter",
            Self::UnknownColumn(_) => "unknown_column",
            Self::UnknownConflictColumn(_) => "unknown_conflict_column",
            Self::EmptyBatch => "empty_batch",
            Self::MissingConflictTarget(_) => "missing_conflict_target",
            Self::MissingFilter(_) => "missing_filter",
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::InvalidBody(_) => "invalid_body",
            Self::ValidationError(_) => "validation_error",
            Self::TableNotFound(_) => "table_not_found",
            Self::ResourceNotFound => "not_found",
            Self::DatabaseError(_) => "database_error",
            Self::DecodeError(_) => "decode_error",
            Self::ConfigError(_) => "config_error",
            Self::InternalError(_) => "internal_error",
            Self::IoError(_) => "io_error",
            Self::JsonError(_) => "invalid_json",
        }
    }

    /// Whether the error was caused by the client request
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(Error::EmptyBatch.status_code(), 400);
        assert_eq!(Error::UnknownColumn("x".into()).status_code(), 400);
        assert_eq!(Error::MissingFilter("Batch delete").status_code(), 400);
        assert_eq!(Error::ResourceNotFound.status_code(), 404);
        assert_eq!(Error::DatabaseError("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(Error::EmptyBatch.to_string(), "Empty array provided");
        assert_eq!(
            Error::MissingFilter("Batch delete").to_string(),
            "Batch delete requires at least one filter"
        );
        assert_eq!(
            Error::MissingConflictTarget("logs".into()).to_string(),
            "Cannot perform upsert on table logs: no primary key or unique constraint"
        );
        assert!(Error::invalid_or_format("status.eq")
            .to_string()
            .starts_with("invalid OR filter format"));
        assert!(Error::invalid_and_format("status")
            .to_string()
            .starts_with("invalid AND filter format"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::EmptyBatch.error_code(), "empty_batch");
        assert_eq!(Error::TableNotFound("t".into()).error_code(), "table_not_found");
        assert!(Error::EmptyBatch.is_client_error());
        assert!(!Error::DecodeError("bad".into()).is_client_error());
    }
}
