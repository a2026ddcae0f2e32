//! Error types for the browser layer.

use thiserror::Error;

/// Errors that can occur while driving the browser.
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Chromium launch or protocol failure
    #[error("chromium error: {0}")]
    Chromium(String),

    /// Navigation failed with a parsed reason
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Selector did not resolve to an element in time
    #[error("selector not found: {0}")]
    SelectorNotFound(String),

    /// Element exists but is not visible/interactable
    #[error("element hidden: {0}")]
    ElementHidden(String),

    /// Operation exceeded its deadline
    #[error("timed out: {0}")]
    Timeout(String),

    /// In-page script evaluation failed
    #[error("script evaluation failed: {0}")]
    Evaluation(String),

    /// The page or browser context was torn down mid-operation
    #[error("page gone: {0}")]
    PageGone(String),
}

impl BrowserError {
    /// Whether the error indicates the page/context was destroyed, which the
    /// observation layer demotes to an empty snapshot.
    #[must_use]
    pub fn is_page_gone(&self) -> bool {
        matches!(self, Self::PageGone(_))
    }
}

/// Result type alias for browser operations.
pub type Result<T> = std::result::Result<T, BrowserError>;
