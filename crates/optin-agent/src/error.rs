//! Error types for the agent.
//!
//! Most failures become [`optin_core::Outcome`] records rather than errors;
//! only failures that must stop the whole run (fatal LLM auth/quota errors,
//! browser loss) propagate as `AgentError`.

use thiserror::Error;

/// Errors that abort URL processing.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Browser-layer failure
    #[error("browser error: {0}")]
    Browser(#[from] optin_browser::BrowserError),

    /// LLM failure (check [`optin_llm::LlmError::is_fatal`])
    #[error("LLM error: {0}")]
    Llm(#[from] optin_llm::LlmError),

    /// CAPTCHA solver transport failure
    #[error("captcha solver error: {0}")]
    Solver(String),
}

impl AgentError {
    /// Whether the error must terminate the run (not just this URL).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Llm(e) if e.is_fatal())
    }
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use optin_llm::LlmError;

    #[test]
    fn test_fatality_mirrors_llm() {
        assert!(AgentError::Llm(LlmError::QuotaExceeded("q".into())).is_fatal());
        assert!(!AgentError::Llm(LlmError::Timeout { seconds: 60 }).is_fatal());
        assert!(!AgentError::Solver("down".into()).is_fatal());
    }
}
