//! Per-URL outcome records.

use crate::action::ActionRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final status of one processed URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Signup evidence present (fields filled + submit observed)
    Success,
    /// Processing ran but did not produce a signup
    Failed,
    /// The page was rejected before or during processing
    Skipped,
    /// An unhandled exception surfaced
    Error,
}

impl OutcomeStatus {
    /// Wire/DB representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Taxonomy of surfaced failure/skip causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The form rejected our input
    Validation,
    /// Selector timed out or element absent
    NotFound,
    /// Element hidden or occluded
    Hidden,
    /// Invalid or hallucinated selector
    Selector,
    /// Browser navigation / HTTP transport failure
    Network,
    /// Blocking CAPTCHA left unsolved
    Captcha,
    /// LLM transport failure (quota, auth, rate limit, timeout)
    LlmError,
    /// Fields filled but no submit button found
    NoSubmit,
    /// Could not fill any field
    NoFields,
    /// Submitted, but no success confirmation observed
    NoConfirmation,
    /// Loop guard aborted the URL
    StuckLoop,
    /// Blog/article page with no signup form
    BlogArticle,
    /// Login-only or account-registration page
    LoginPage,
    /// Form requires payment
    PaymentRequired,
    /// URL or title identifies an app store
    AppStore,
    /// Page failed to load
    LoadError,
    /// No signup form anywhere on the page
    NoForm,
    /// Unhandled exception
    Exception,
}

impl ErrorCategory {
    /// Wire/DB representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Hidden => "hidden",
            Self::Selector => "selector",
            Self::Network => "network",
            Self::Captcha => "captcha",
            Self::LlmError => "llm_error",
            Self::NoSubmit => "no_submit",
            Self::NoFields => "no_fields",
            Self::NoConfirmation => "no_confirmation",
            Self::StuckLoop => "stuck_loop",
            Self::BlogArticle => "blog_article",
            Self::LoginPage => "login_page",
            Self::PaymentRequired => "payment_required",
            Self::AppStore => "app_store",
            Self::LoadError => "load_error",
            Self::NoForm => "no_form",
            Self::Exception => "exception",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured result emitted for every URL the agent finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// Final status
    pub status: OutcomeStatus,
    /// Selectors that were successfully filled
    pub fields_filled: Vec<String>,
    /// Normalised field types that were filled
    pub field_types_filled: Vec<String>,
    /// Human sentence describing the primary failure/skip cause
    pub primary_error: Option<String>,
    /// Category of the primary cause
    pub primary_category: Option<ErrorCategory>,
    /// Extra context persisted alongside the record
    pub details: Option<String>,
    /// Full action log
    pub actions: Vec<ActionRecord>,
    /// Real submit clicks observed
    pub submit_attempts: u32,
    /// Latching submit flag
    pub form_submitted: bool,
    /// The loop guard fired
    pub stuck_loop_detected: bool,
    /// A CAPTCHA solve was attempted
    pub captcha_attempted: bool,
    /// A CAPTCHA solve verified successful
    pub captcha_solved: bool,
    /// The stop signal interrupted processing (URL stays pending)
    pub interrupted_by_stop: bool,
}

impl Outcome {
    /// A skip outcome with the given category and reason.
    #[must_use]
    pub fn skipped(category: ErrorCategory, reason: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Skipped,
            fields_filled: Vec::new(),
            field_types_filled: Vec::new(),
            primary_error: Some(reason.into()),
            primary_category: Some(category),
            details: None,
            actions: Vec::new(),
            submit_attempts: 0,
            form_submitted: false,
            stuck_loop_detected: false,
            captcha_attempted: false,
            captcha_solved: false,
            interrupted_by_stop: false,
        }
    }

    /// An outcome for a run interrupted by the stop signal. Never persisted.
    #[must_use]
    pub fn interrupted() -> Self {
        let mut outcome = Self::skipped(ErrorCategory::Exception, "Stop requested");
        outcome.primary_category = None;
        outcome.primary_error = None;
        outcome.interrupted_by_stop = true;
        outcome
    }

    /// Signup label used in persisted details: "Newsletter" for ≤ 2 filled
    /// fields, "Account" otherwise.
    #[must_use]
    pub fn signup_type(&self) -> &'static str {
        if self.fields_filled.len() <= 2 {
            "Newsletter"
        } else {
            "Account"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(OutcomeStatus::Success.as_str(), "success");
        assert_eq!(OutcomeStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_category_strings() {
        assert_eq!(ErrorCategory::StuckLoop.as_str(), "stuck_loop");
        assert_eq!(ErrorCategory::NoConfirmation.to_string(), "no_confirmation");
        assert_eq!(ErrorCategory::AppStore.as_str(), "app_store");
    }

    #[test]
    fn test_signup_type_threshold() {
        let mut outcome = Outcome::skipped(ErrorCategory::NoForm, "x");
        outcome.fields_filled = vec!["#email".into(), "#name".into()];
        assert_eq!(outcome.signup_type(), "Newsletter");
        outcome.fields_filled.push("#phone".into());
        assert_eq!(outcome.signup_type(), "Account");
    }

    #[test]
    fn test_interrupted_has_no_category() {
        let outcome = Outcome::interrupted();
        assert!(outcome.interrupted_by_stop);
        assert!(outcome.primary_category.is_none());
    }

    #[test]
    fn test_outcome_serde_round_trip() {
        let outcome = Outcome::skipped(ErrorCategory::BlogArticle, "Detected blog structure");
        let json = serde_json::to_string(&outcome).expect("serialize outcome");
        let back: Outcome = serde_json::from_str(&json).expect("deserialize outcome");
        assert_eq!(back.status, OutcomeStatus::Skipped);
        assert_eq!(back.primary_category, Some(ErrorCategory::BlogArticle));
    }
}
