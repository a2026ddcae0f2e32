//! Error types for the database layer.

use thiserror::Error;

/// Errors that can occur during database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open or create the database file
    #[error("failed to open database: {0}")]
    Open(String),

    /// Migration execution failed
    #[error("migration failed: {0}")]
    Migration(String),

    /// Query execution failed
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// Stored JSON did not parse
    #[error("corrupt stored JSON: {0}")]
    CorruptJson(#[from] serde_json::Error),
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DatabaseError::Open("permission denied".to_string());
        assert_eq!(err.to_string(), "failed to open database: permission denied");
    }
}
