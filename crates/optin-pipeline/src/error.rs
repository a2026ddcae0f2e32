//! Error types for the pipeline.

use thiserror::Error;

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Database failure
    #[error("database error: {0}")]
    Database(#[from] optin_db::DatabaseError),

    /// Fatal agent failure (LLM auth/quota)
    #[error("agent error: {0}")]
    Agent(#[from] optin_agent::AgentError),

    /// CSV source failure
    #[error("CSV source error: {0}")]
    Csv(String),

    /// Configuration problem discovered at run time
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::Csv("no url column".to_string());
        assert_eq!(err.to_string(), "CSV source error: no url column");
    }
}
