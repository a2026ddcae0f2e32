//! Loop and hallucination guard.
//!
//! Runs after every action: detects repeated-error loops, two-action
//! patterns and submit storms; checks planner selectors against the
//! observed HTML before they reach the executor.

use crate::selector;
use crate::state::{AgentState, ERROR_REPEAT_TRIGGER, SUBMIT_ATTEMPT_TRIGGER};
use optin_llm::PlannerDecision;

/// Why the loop guard tripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StuckReason {
    /// The same visible error text was observed 3+ times
    RepeatedError(String),
    /// The last 4 action patterns form an a,b,a,b loop
    ActionLoop,
    /// 4+ real submits with no URL change
    SubmitNoProgress(u32),
}

impl StuckReason {
    /// Human sentence for outcome records.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::RepeatedError(text) => {
                let snippet: String = text.chars().take(50).collect();
                format!("Same error repeated: '{snippet}'")
            }
            Self::ActionLoop => "Action loop detected (same fill/submit pattern repeating)".to_string(),
            Self::SubmitNoProgress(attempts) => {
                format!("Form stuck after {attempts} submit attempts (same URL, same errors)")
            }
        }
    }

    /// Whether the trigger looks CAPTCHA-related (hand off to the solver
    /// once before aborting).
    #[must_use]
    pub fn is_captcha_related(&self) -> bool {
        match self {
            Self::RepeatedError(text) => {
                let lower = text.to_lowercase();
                lower.contains("captcha") || lower.contains("recaptcha")
            }
            _ => false,
        }
    }
}

/// Check the stuck-loop conditions against the current state.
#[must_use]
pub fn detect_stuck(state: &AgentState, current_url: &str) -> Option<StuckReason> {
    // Condition 1: some error text seen 3+ times across snapshots
    for (text, count) in &state.error_messages_seen {
        if *count >= ERROR_REPEAT_TRIGGER {
            return Some(StuckReason::RepeatedError(text.clone()));
        }
    }

    // Condition 2: the last 4 patterns form an a,b,a,b loop
    if state.recent_actions.len() >= 4 {
        let recent: Vec<&String> = state.recent_actions.iter().rev().take(4).collect();
        // recent is newest-first: [d, c, b, a]; loop means d==b && c==a
        if recent[0] == recent[2] && recent[1] == recent[3] {
            return Some(StuckReason::ActionLoop);
        }
    }

    // Condition 3: submit storm with no URL movement
    if state.submit_attempts >= SUBMIT_ATTEMPT_TRIGGER {
        if let Some(url_before) = &state.url_before_submit {
            if url_before == current_url {
                return Some(StuckReason::SubmitNoProgress(state.submit_attempts));
            }
        }
    }

    None
}

/// Close-button look-alikes the planner hallucinates after submits; the
/// oracle, not the agent, decides overlay dismissal.
#[must_use]
pub fn is_close_button_lookalike(selector: &str) -> bool {
    let lower = selector.to_lowercase();
    ["×", "close", "dismiss", "x-button", "modal"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Verdict on one planner selector before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorCheck {
    /// Exists (or unparseable shape, accepted conservatively)
    Ok,
    /// Not present in the observed HTML
    Hallucinated,
    /// Close-button look-alike after submission
    CloseButtonAfterSubmit,
}

/// Check a planner selector against the observed HTML.
#[must_use]
pub fn check_selector(selector: &str, html: &str, form_submitted: bool) -> SelectorCheck {
    if form_submitted && is_close_button_lookalike(selector) {
        return SelectorCheck::CloseButtonAfterSubmit;
    }
    if selector::exists_in_html(selector, html) {
        SelectorCheck::Ok
    } else {
        SelectorCheck::Hallucinated
    }
}

/// Validate a batch of planned actions against the HTML they were derived
/// from (P8). Returns the surviving actions and the rejected selectors.
#[must_use]
pub fn validate_plan(
    actions: Vec<PlannerDecision>,
    html: &str,
) -> (Vec<PlannerDecision>, Vec<String>) {
    let mut kept = Vec::new();
    let mut rejected = Vec::new();
    for action in actions {
        match action.action.as_str() {
            "complete" => kept.push(action),
            "fill_field" | "click" => match action.selector.as_deref() {
                Some(sel) if selector::exists_in_html(sel, html) => kept.push(action),
                Some(sel) => rejected.push(sel.to_string()),
                None => {}
            },
            _ => {}
        }
    }
    (kept, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use optin_core::{ActionRecord, PlannedAction};
    use serde_json::json;

    #[test]
    fn test_repeated_error_trigger_at_three() {
        let mut state = AgentState::new_for_url();
        let errors = vec!["Invalid phone number.".to_string()];
        state.note_error_messages(&errors);
        state.note_error_messages(&errors);
        assert!(detect_stuck(&state, "https://acme.test/").is_none());
        state.note_error_messages(&errors);
        assert!(matches!(
            detect_stuck(&state, "https://acme.test/"),
            Some(StuckReason::RepeatedError(_))
        ));
    }

    #[test]
    fn test_two_action_loop_window_of_four() {
        let mut state = AgentState::new_for_url();
        let fill = PlannedAction::fill("#phone", optin_core::FieldType::Phone, "202", "fill phone");
        let submit = PlannedAction::click("#submit", "submit form");
        for _ in 0..2 {
            state.record_action(ActionRecord::from_planned(&fill, true, None));
            state.record_action(ActionRecord::from_planned(&submit, true, None));
        }
        assert_eq!(
            detect_stuck(&state, "https://acme.test/"),
            Some(StuckReason::ActionLoop)
        );
    }

    #[test]
    fn test_submit_storm_requires_same_url() {
        let mut state = AgentState::new_for_url();
        state.url_before_submit = Some("https://acme.test/".to_string());
        for _ in 0..4 {
            state.record_real_submit();
        }
        assert_eq!(
            detect_stuck(&state, "https://acme.test/"),
            Some(StuckReason::SubmitNoProgress(4))
        );
        // URL moved: not stuck
        assert!(detect_stuck(&state, "https://acme.test/thanks").is_none());
    }

    #[test]
    fn test_captcha_related_reason() {
        let reason = StuckReason::RepeatedError("please complete the captcha".to_string());
        assert!(reason.is_captcha_related());
        assert!(!StuckReason::ActionLoop.is_captcha_related());
    }

    #[test]
    fn test_close_button_lookalike() {
        assert!(is_close_button_lookalike("button:has-text('×')"));
        assert!(is_close_button_lookalike(".modal-close"));
        assert!(is_close_button_lookalike("[aria-label='Dismiss']"));
        assert!(!is_close_button_lookalike("#submit"));
    }

    #[test]
    fn test_check_selector() {
        let html = r#"<input id="email" type="email">"#;
        assert_eq!(check_selector("#email", html, false), SelectorCheck::Ok);
        assert_eq!(
            check_selector("#ghost", html, false),
            SelectorCheck::Hallucinated
        );
        assert_eq!(
            check_selector(".modal-close", html, true),
            SelectorCheck::CloseButtonAfterSubmit
        );
        // Before submission, close-button selectors get the normal check
        assert_eq!(
            check_selector(".modal-close", html, false),
            SelectorCheck::Hallucinated
        );
    }

    #[test]
    fn test_validate_plan_filters_hallucinations() {
        let html = r#"<form><input id="email" name="email"><button id="go">Subscribe</button></form>"#;
        let actions: Vec<PlannerDecision> = vec![
            serde_json::from_value(json!({"action": "fill_field", "selector": "#email", "field_type": "email"})).unwrap(),
            serde_json::from_value(json!({"action": "fill_field", "selector": "#TojDQFSj7Qgr64InnMYO", "field_type": "full_name"})).unwrap(),
            serde_json::from_value(json!({"action": "click", "selector": "#go"})).unwrap(),
            serde_json::from_value(json!({"action": "complete", "reasoning": "done"})).unwrap(),
        ];
        let (kept, rejected) = validate_plan(actions, html);
        assert_eq!(kept.len(), 3);
        assert_eq!(rejected, vec!["#TojDQFSj7Qgr64InnMYO".to_string()]);
    }
}
