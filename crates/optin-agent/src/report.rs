//! Failure reporting.
//!
//! Distils the action log into one human sentence and one taxonomy
//! category, prioritised the way users ask about failures: LLM loss first,
//! then validation loops, CAPTCHA, concrete field failures, missing submit,
//! and the residual buckets.

use crate::executor::friendly_field_name;
use crate::state::AgentState;
use optin_core::{ActionKind, ErrorCategory};

/// The distilled failure cause.
#[derive(Debug, Clone)]
pub struct FailureReport {
    /// One human sentence
    pub primary_error: String,
    /// Taxonomy category
    pub primary_category: ErrorCategory,
    /// Compact context string persisted in the details column
    pub details: String,
}

fn error_matches(error: &str, needles: &[&str]) -> bool {
    let lower = error.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// Build the failure report for a URL that did not succeed.
#[must_use]
pub fn build_failure_report(state: &AgentState) -> FailureReport {
    let failed_fields: Vec<(String, String)> = state
        .actions
        .iter()
        .filter(|a| !a.success && a.kind == ActionKind::FillField)
        .filter_map(|a| {
            a.error_message.as_ref().map(|e| {
                (
                    friendly_field_name(a.field_type, a.selector.as_deref()),
                    e.clone(),
                )
            })
        })
        .collect();

    let all_errors: Vec<&str> = state
        .actions
        .iter()
        .filter(|a| !a.success)
        .filter_map(|a| a.error_message.as_deref())
        .collect();

    let (primary_error, primary_category) = if let Some(reason) = &state.llm_failure_reason {
        let lower = reason.to_lowercase();
        let sentence = if lower.contains("rate limit") {
            "LLM rate limit reached - wait a moment and run again".to_string()
        } else if lower.contains("api key") {
            "LLM API key error - check the key in your configuration".to_string()
        } else if lower.contains("timed out") || lower.contains("timeout") {
            "LLM request timed out - the API may be slow".to_string()
        } else if lower.contains("network") {
            "Network error reaching the LLM API".to_string()
        } else {
            let snippet: String = reason.chars().take(100).collect();
            format!("LLM analysis failed: {snippet}")
        };
        (sentence, ErrorCategory::LlmError)
    } else if state.stuck_loop_detected && !state.error_messages_seen.is_empty() {
        let most_common = state
            .error_messages_seen
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(text, _)| text.as_str())
            .unwrap_or_default();
        let snippet: String = most_common.chars().take(60).collect();
        (
            format!("Form keeps rejecting input: '{snippet}'"),
            ErrorCategory::Validation,
        )
    } else if state.stuck_loop_detected {
        (
            "Stuck repeating the same actions without progress".to_string(),
            ErrorCategory::StuckLoop,
        )
    } else if all_errors.iter().any(|e| error_matches(e, &["captcha"])) {
        (
            "CAPTCHA is blocking form submission".to_string(),
            ErrorCategory::Captcha,
        )
    } else if let Some((field, error)) = failed_fields.first() {
        let sentence = if failed_fields.len() == 1 {
            error.clone()
        } else {
            let others: Vec<&str> = failed_fields
                .iter()
                .skip(1)
                .take(2)
                .map(|(name, _)| name.as_str())
                .collect();
            format!("{error} (also failed: {})", others.join(", "))
        };
        let category = if error_matches(error, &["not found"]) {
            ErrorCategory::NotFound
        } else if error_matches(error, &["hidden", "covered"]) {
            ErrorCategory::Hidden
        } else if error_matches(error, &["rejected", "validation", "invalid"]) {
            ErrorCategory::Validation
        } else {
            let _ = field;
            ErrorCategory::NotFound
        };
        (sentence, category)
    } else if state.submit_attempts == 0 && !state.fields_filled.is_empty() {
        let filled = state.filled_field_type_names();
        let sentence = if filled.is_empty() {
            format!(
                "Filled {} field(s) but could not find Submit button",
                state.fields_filled.len()
            )
        } else {
            format!(
                "Filled {} but could not find Submit button",
                filled.join(", ")
            )
        };
        (sentence, ErrorCategory::NoSubmit)
    } else if all_errors
        .iter()
        .any(|e| error_matches(e, &["not found", "button not found"]))
    {
        (
            all_errors
                .iter()
                .find(|e| error_matches(e, &["not found"]))
                .map(|e| (*e).to_string())
                .unwrap_or_default(),
            ErrorCategory::NotFound,
        )
    } else if all_errors.iter().any(|e| error_matches(e, &["hidden", "covered"])) {
        (
            all_errors
                .iter()
                .find(|e| error_matches(e, &["hidden", "covered"]))
                .map(|e| (*e).to_string())
                .unwrap_or_default(),
            ErrorCategory::Hidden,
        )
    } else if state.hallucination_count >= 5
        || (state.hallucination_count > 0 && state.fields_filled.is_empty())
    {
        (
            "Could not locate form fields on this page".to_string(),
            ErrorCategory::Selector,
        )
    } else if all_errors
        .iter()
        .any(|e| error_matches(e, &["network", "connection"]))
    {
        (
            "Network error while interacting with form".to_string(),
            ErrorCategory::Network,
        )
    } else if state.form_submitted {
        (
            "Form was submitted but no success message was detected".to_string(),
            ErrorCategory::NoConfirmation,
        )
    } else if state.fields_filled.is_empty() {
        (
            "Could not find or fill any form fields".to_string(),
            ErrorCategory::NoFields,
        )
    } else {
        (
            "Form submission failed".to_string(),
            ErrorCategory::NoConfirmation,
        )
    };

    let mut details_parts = vec![
        format!("Category: {primary_category}"),
        format!("Fields filled: {}", state.fields_filled.len()),
    ];
    let field_types = state.filled_field_type_names();
    if !field_types.is_empty() {
        details_parts.push(format!("Field types: {}", field_types.join(", ")));
    }
    if state.stuck_loop_detected {
        details_parts.push("Stuck in validation loop".to_string());
    }
    if state.submit_attempts > 0 {
        details_parts.push(format!("Submit attempts: {}", state.submit_attempts));
    }
    if state.captcha_attempted {
        let status = if state.captcha_solved { "solved" } else { "failed" };
        details_parts.push(format!("CAPTCHA: {status}"));
    }
    if state.hallucination_count > 0 {
        details_parts.push(format!("Hallucinations: {}", state.hallucination_count));
    }

    FailureReport {
        primary_error,
        primary_category,
        details: details_parts.join(" | "),
    }
}
