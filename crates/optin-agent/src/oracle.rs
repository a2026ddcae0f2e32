//! The success oracle.
//!
//! Success is never decided from a single phrase: strong phrases stand
//! alone, weaker signals (URL change, form disappearance, overlays, simple
//! keywords) only count after a real submit, and negative validation text
//! vetoes every weak combination.

use crate::state::AgentState;
use optin_core::PageSnapshot;

/// Phrases that alone confirm a completed signup.
pub const STRONG_SUCCESS_PHRASES: &[&str] = &[
    "thank you for signing up",
    "thanks for signing up",
    "thank you for registering",
    "thanks for registering",
    "registration successful",
    "signup successful",
    "sign up successful",
    "successfully registered",
    "successfully signed up",
    "account created",
    "account has been created",
    "welcome! your account",
    "welcome to your account",
    "check your email for confirmation",
    "check your inbox",
    "verification email sent",
    "confirmation email sent",
    "we've sent you an email",
    "we have sent you an email",
    "please verify your email",
    "please check your email",
    "you're all set",
    "you are all set",
    "you're in!",
    "you are in!",
    "registration complete",
    "signup complete",
    "sign up complete",
    "congratulations! you",
    "welcome aboard",
    "you've been added",
    "you have been added",
    "subscription confirmed",
    "you're subscribed",
    "you are subscribed",
    "successfully subscribed",
    "thank you for subscribing",
    "thanks for subscribing",
];

/// Weak keywords that need corroboration from a submit-side signal.
pub const WEAK_SUCCESS_KEYWORDS: &[&str] = &["thank", "success", "confirm", "welcome", "complete"];

/// Text that vetoes weak success combinations outright.
pub const NEGATIVE_PATTERNS: &[&str] = &[
    "error",
    "failed",
    "invalid",
    "required field",
    "please fill",
    "please enter",
    "please provide",
    "must be",
    "cannot be empty",
    "is required",
    "try again",
    "forgot password",
    "sign in",
    "log in",
];

/// Phrases the loop guard accepts as proof the stuck form actually went
/// through (residual error text notwithstanding).
pub const RESCUE_PHRASES: &[&str] = &[
    "thank you",
    "thanks for",
    "you're in",
    "you are in",
    "successfully registered",
    "registration complete",
    "welcome",
    "check your email",
    "check your inbox",
    "confirmation sent",
    "thanks for registering",
    "successfully subscribed",
];

/// URL tokens the loop guard accepts as a success redirect.
pub const RESCUE_URL_TOKENS: &[&str] = &["thank", "success", "confirm", "welcome", "registered"];

/// One oracle decision.
#[derive(Debug, Clone)]
pub struct SuccessCheck {
    /// Whether the signals add up to success
    pub is_success: bool,
    /// Which signal combination fired
    pub reason: String,
}

impl SuccessCheck {
    fn no() -> Self {
        Self {
            is_success: false,
            reason: "No clear success indicator".to_string(),
        }
    }

    fn yes(reason: impl Into<String>) -> Self {
        Self {
            is_success: true,
            reason: reason.into(),
        }
    }
}

/// Combine the snapshot's signals with submit-side state into a calibrated
/// success decision.
#[must_use]
pub fn detect_success(snapshot: &PageSnapshot, state: &AgentState) -> SuccessCheck {
    let text = &snapshot.visible_text;

    // 1. Strong phrases stand alone
    for phrase in STRONG_SUCCESS_PHRASES {
        if text.contains(phrase) {
            return SuccessCheck::yes(format!("Strong success pattern: '{phrase}'"));
        }
    }

    let weak_present = WEAK_SUCCESS_KEYWORDS.iter().any(|kw| text.contains(kw));

    if state.form_submitted && state.submit_attempts > 0 {
        // 2. URL change since the submit, plus a weak keyword
        if let Some(url_before) = &state.url_before_submit {
            if !snapshot.url.is_empty() && &snapshot.url != url_before && weak_present {
                return SuccessCheck::yes("URL changed after submit + success keyword");
            }
        }

        // 3. The form disappeared, plus a weak keyword
        if state.form_count_before_submit > 0 && snapshot.form_count == 0 && weak_present {
            return SuccessCheck::yes("Form disappeared + success keyword");
        }

        // 4. Post-submit overlay with explicit success or recommendation
        // content. An iframe alone is never sufficient - it may be a CAPTCHA.
        if let Some(overlay) = &snapshot.overlay {
            if overlay.has_captcha_content {
                // The CAPTCHA handler owns this; not a success signal
            } else if overlay.is_success_text {
                let snippet: String = overlay.text.chars().take(50).collect();
                return SuccessCheck::yes(format!("Success overlay: {snippet}"));
            } else if overlay.is_recommendation {
                return SuccessCheck::yes("Post-signup recommendation overlay");
            }
        }
    }

    // 5. Negative veto over the remaining weak combination
    let has_negative = NEGATIVE_PATTERNS.iter().any(|neg| text.contains(neg));
    if weak_present && !has_negative && state.form_submitted && state.fields_filled.len() >= 2 {
        return SuccessCheck::yes("Form submitted + multiple fields + success keyword");
    }

    SuccessCheck::no()
}

/// Loop-guard rescue: does the current page read as a success despite the
/// repeated errors that tripped the guard?
#[must_use]
pub fn rescue_success(visible_text: &str, url: &str) -> bool {
    let text = visible_text.to_lowercase();
    let url = url.to_lowercase();
    RESCUE_PHRASES.iter().any(|p| text.contains(p))
        || RESCUE_URL_TOKENS.iter().any(|t| url.contains(t))
}

/// Final audit at URL completion (P1): a success claim without submission
/// evidence or without any filled field is downgraded.
#[must_use]
pub fn audit_success(state: &AgentState) -> bool {
    if !state.success {
        return false;
    }
    if !state.has_submit_evidence() {
        tracing::warn!("Overriding success: no submit/click attempts recorded");
        return false;
    }
    if state.fields_filled.is_empty() {
        tracing::warn!("Overriding success: no fields were filled");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use optin_core::{ActionRecord, FieldType, PageSnapshot, PlannedAction};

    fn submitted_state() -> AgentState {
        let mut state = AgentState::new_for_url();
        let fill = PlannedAction::fill("#email", FieldType::Email, "x@y.z", "fill");
        state.record_action(ActionRecord::from_planned(&fill, true, None));
        state.url_before_submit = Some("https://acme.test/".to_string());
        state.form_count_before_submit = 1;
        state.record_real_submit();
        state
    }

    fn page(text: &str, url: &str) -> PageSnapshot {
        let mut snap = PageSnapshot::empty(url);
        snap.visible_text = text.to_lowercase();
        snap
    }

    #[test]
    fn test_strong_phrase_alone() {
        let state = AgentState::new_for_url();
        let snap = page("Thank you for subscribing to our list", "https://acme.test/");
        let check = detect_success(&snap, &state);
        assert!(check.is_success);
        assert!(check.reason.contains("Strong success pattern"));
    }

    #[test]
    fn test_weak_keyword_alone_is_not_success() {
        // "Welcome to Our Site" headers before any submit must not pass
        let state = AgentState::new_for_url();
        let snap = page("welcome to our site, sign up below", "https://acme.test/");
        assert!(!detect_success(&snap, &state).is_success);
    }

    #[test]
    fn test_url_change_plus_weak_keyword() {
        let state = submitted_state();
        let mut snap = page("success! one more step", "https://acme.test/confirmed");
        snap.form_count = 1;
        let check = detect_success(&snap, &state);
        assert!(check.is_success);
        assert!(check.reason.contains("URL changed"));
    }

    #[test]
    fn test_form_disappearance_plus_weak_keyword() {
        let state = submitted_state();
        let mut snap = page("thank you", "https://acme.test/");
        snap.form_count = 0;
        let check = detect_success(&snap, &state);
        assert!(check.is_success);
    }

    #[test]
    fn test_negative_veto() {
        let mut state = submitted_state();
        let extra = PlannedAction::fill("#name", FieldType::FullName, "Jane Doe", "fill");
        state.record_action(ActionRecord::from_planned(&extra, true, None));
        // Same URL, form still there, weak keyword present but negative too
        let mut snap = page("thank you. error: invalid phone number", "https://acme.test/");
        snap.form_count = 1;
        assert!(!detect_success(&snap, &state).is_success);
    }

    #[test]
    fn test_overlay_iframe_alone_not_success() {
        let state = submitted_state();
        let mut snap = page("", "https://acme.test/");
        snap.form_count = 1;
        snap.overlay = Some(optin_core::OverlayInfo {
            present: true,
            is_success_text: false,
            is_recommendation: false,
            has_iframe: true,
            iframe_src: Some("https://example.com/widget".to_string()),
            has_captcha_content: false,
            has_error_text: false,
            close_selector: None,
            text: String::new(),
        });
        assert!(!detect_success(&snap, &state).is_success);
    }

    #[test]
    fn test_overlay_success_text() {
        let state = submitted_state();
        let mut snap = page("", "https://acme.test/");
        snap.form_count = 1;
        snap.overlay = Some(optin_core::OverlayInfo {
            present: true,
            is_success_text: true,
            is_recommendation: false,
            has_iframe: false,
            iframe_src: None,
            has_captcha_content: false,
            has_error_text: false,
            close_selector: None,
            text: "thanks for subscribing".to_string(),
        });
        assert!(detect_success(&snap, &state).is_success);
    }

    #[test]
    fn test_rescue() {
        assert!(rescue_success("Thanks for registering!", "https://acme.test/"));
        assert!(rescue_success("nothing here", "https://acme.test/thank-you"));
        assert!(!rescue_success("invalid phone number", "https://acme.test/signup"));
    }

    #[test]
    fn test_audit_requires_evidence() {
        let mut state = AgentState::new_for_url();
        state.success = true;
        // No fills, no submits
        assert!(!audit_success(&state));

        let mut state = submitted_state();
        state.success = true;
        assert!(audit_success(&state));
    }

    #[test]
    fn test_audit_requires_filled_fields() {
        let mut state = AgentState::new_for_url();
        state.success = true;
        state.record_real_submit();
        assert!(!audit_success(&state));
    }
}
