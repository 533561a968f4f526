//! Unified error types for docvault
use thiserror::Error;

/// Main error type for document storage
#[derive(Error, Debug)]
pub enum DocError {
    /// Missing or oversize required fields; nothing was persisted
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown or misconfigured backend id
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metadata row or backend key absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend read/write/delete failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Operation not valid for the record's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocError {
    /// Stable label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            DocError::Validation(_) => "validation",
            DocError::Config(_) => "config",
            DocError::NotFound(_) => "not_found",
            DocError::Storage(_) => "storage",
            DocError::InvalidState(_) => "invalid_state",
            DocError::Database(_) => "database",
            DocError::Migration(_) => "migration",
            DocError::Io(_) => "io",
            DocError::Internal(_) => "internal",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DocError::NotFound(_))
            || matches!(self, DocError::Database(sqlx::Error::RowNotFound))
    }
}

impl From<validator::ValidationErrors> for DocError {
    fn from(errors: validator::ValidationErrors) -> Self {
        DocError::Validation(errors.to_string())
    }
}

/// Result type alias for document operations
pub type DocResult<T> = Result<T, DocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(DocError::Validation("x".into()).kind(), "validation");
        assert_eq!(DocError::Storage("x".into()).kind(), "storage");
        assert_eq!(DocError::Database(sqlx::Error::RowNotFound).kind(), "database");
    }

    #[test]
    fn test_not_found_detection() {
        assert!(DocError::NotFound("doc".into()).is_not_found());
        assert!(DocError::Database(sqlx::Error::RowNotFound).is_not_found());
        assert!(!DocError::Config("doc".into()).is_not_found());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = DocError::Config("unknown backend id: s3-bucket".into());
        assert_eq!(err.to_string(), "Configuration error: unknown backend id: s3-bucket");
    }
}
