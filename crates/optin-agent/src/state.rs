//! Per-URL agent state.
//!
//! One [`AgentState`] is created per URL and destroyed when its outcome is
//! emitted. It is owned by the agent loop and passed by reference to every
//! component; nothing here is shared or global.

use optin_core::{ActionKind, ActionRecord, FieldType};
use optin_llm::ActiveFormContext;
use std::collections::BTreeMap;
use std::collections::VecDeque;

/// Step budget per URL.
pub const MAX_STEPS: u32 = 30;
/// Hard failures of any kind before the URL is abandoned.
pub const MAX_TOTAL_FAILURES: usize = 5;
/// Consecutive failures of one selector before demanding a new approach.
pub const MAX_SELECTOR_FAILURES: usize = 3;
/// Identical visible error count that trips the loop guard.
pub const ERROR_REPEAT_TRIGGER: u32 = 3;
/// Real submit attempts without a URL change that trip the loop guard.
pub const SUBMIT_ATTEMPT_TRIGGER: u32 = 4;
/// Action-pattern window retained for loop detection.
pub const RECENT_ACTION_WINDOW: usize = 10;
/// CAPTCHA solver attempts per URL.
pub const MAX_CAPTCHA_SOLVE_ATTEMPTS: u32 = 2;
/// Anti-bot pacing between steps, in milliseconds.
pub const STEP_PACING_MS: u64 = 1500;

/// Mutable state of one URL's signup attempt.
#[derive(Debug, Default)]
pub struct AgentState {
    /// Current step, 1-based
    pub step: u32,
    /// Append-only action log
    pub actions: Vec<ActionRecord>,
    /// Selector → value for every successful fill (exact-refill prevention)
    pub fields_filled: Vec<(String, String)>,
    /// Field type → selector for every successful fill (type-level refill prevention)
    pub field_types_filled: Vec<(FieldType, String)>,
    /// Selectors of checkboxes toggled on
    pub checkboxes_checked: Vec<String>,
    /// Times the planner tried to change the country dropdown
    pub country_code_attempts: u32,
    /// A synthesised phone replaced a planner phone decision
    pub phone_fallback_used: bool,
    /// Dial code detected on the page
    pub detected_country_code: Option<String>,
    /// Real submit clicks (monotonic)
    pub submit_attempts: u32,
    /// Any click after the first successful fill
    pub click_attempts_after_fill: u32,
    /// Latching submit flag (false→true only)
    pub form_submitted: bool,
    /// URL captured before the last real submit
    pub url_before_submit: Option<String>,
    /// Form count captured before the last real submit
    pub form_count_before_submit: usize,
    /// The form whose input was most recently filled
    pub active_form: Option<ActiveFormContext>,
    /// Visible error text → times observed
    pub error_messages_seen: BTreeMap<String, u32>,
    /// Last N action-pattern strings
    pub recent_actions: VecDeque<String>,
    /// A CAPTCHA solve was attempted on this URL
    pub captcha_attempted: bool,
    /// A CAPTCHA solve verified successful
    pub captcha_solved: bool,
    /// Solver submissions made on this URL
    pub captcha_solve_attempts: u32,
    /// Selectors the LLM produced that do not exist
    pub hallucination_count: u32,
    /// The loop guard fired
    pub stuck_loop_detected: bool,
    /// Terminal LLM failure description
    pub llm_failure_reason: Option<String>,
    /// Selectors verified absent from the DOM (insertion-ordered, deduped)
    pub non_existent_selectors: Vec<String>,
    /// Loop termination flag
    pub complete: bool,
    /// Speculative success flag, audited at finalisation
    pub success: bool,
}

impl AgentState {
    /// Fresh state for one URL.
    #[must_use]
    pub fn new_for_url() -> Self {
        Self {
            step: 1,
            ..Self::default()
        }
    }

    /// Append an executed action and update the fill/click bookkeeping.
    pub fn record_action(&mut self, record: ActionRecord) {
        if record.success && record.kind == ActionKind::FillField {
            if let (Some(selector), Some(value)) = (&record.selector, &record.value) {
                if !self.fields_filled.iter().any(|(s, _)| s == selector) {
                    self.fields_filled.push((selector.clone(), value.clone()));
                }
                if let Some(field_type) = record.field_type {
                    if !self
                        .field_types_filled
                        .iter()
                        .any(|(t, _)| *t == field_type)
                    {
                        self.field_types_filled.push((field_type, selector.clone()));
                    }
                    if field_type == FieldType::Checkbox
                        && value == "true"
                        && !self.checkboxes_checked.contains(selector)
                    {
                        self.checkboxes_checked.push(selector.clone());
                    }
                }
            }
        }

        self.recent_actions.push_back(record.pattern());
        while self.recent_actions.len() > RECENT_ACTION_WINDOW {
            self.recent_actions.pop_front();
        }
        self.actions.push(record);
    }

    /// Track the error messages visible in one observation.
    pub fn note_error_messages(&mut self, messages: &[String]) {
        for message in messages {
            let text = message.trim().to_lowercase();
            if text.len() > 3 {
                *self.error_messages_seen.entry(text).or_insert(0) += 1;
            }
        }
    }

    /// Record a real submit click (monotonic counters, latching flag).
    pub fn record_real_submit(&mut self) {
        self.submit_attempts += 1;
        self.form_submitted = true;
    }

    /// Whether this logical field type was already filled.
    #[must_use]
    pub fn is_field_type_filled(&self, field_type: FieldType) -> bool {
        self.field_types_filled.iter().any(|(t, _)| *t == field_type)
    }

    /// Selectors filled so far, in order.
    #[must_use]
    pub fn filled_selectors(&self) -> Vec<String> {
        self.fields_filled.iter().map(|(s, _)| s.clone()).collect()
    }

    /// Canonical names of the field types filled so far.
    #[must_use]
    pub fn filled_field_type_names(&self) -> Vec<String> {
        self.field_types_filled
            .iter()
            .map(|(t, _)| t.as_str().to_string())
            .collect()
    }

    /// Add a selector to the hallucination blocklist (deduped).
    pub fn add_non_existent_selector(&mut self, selector: &str) {
        if !self.non_existent_selectors.iter().any(|s| s == selector) {
            self.non_existent_selectors.push(selector.to_string());
        }
        self.hallucination_count += 1;
    }

    /// Whether a selector is on the blocklist.
    #[must_use]
    pub fn is_blocklisted(&self, selector: &str) -> bool {
        self.non_existent_selectors.iter().any(|s| s == selector)
    }

    /// Total failed actions so far.
    #[must_use]
    pub fn total_failures(&self) -> usize {
        self.actions.iter().filter(|a| !a.success).count()
    }

    /// Failures within the last `window` actions.
    #[must_use]
    pub fn recent_consecutive_failures(&self, window: usize) -> usize {
        self.actions
            .iter()
            .rev()
            .take(window)
            .filter(|a| !a.success)
            .count()
    }

    /// Failures of one selector within the last five actions.
    #[must_use]
    pub fn selector_failure_count(&self, selector: &str) -> usize {
        self.actions
            .iter()
            .rev()
            .take(5)
            .filter(|a| !a.success && a.selector.as_deref() == Some(selector))
            .count()
    }

    /// Per-selector failure hints for the planner prompt.
    #[must_use]
    pub fn failed_selector_hints(&self) -> Vec<String> {
        let mut counts: BTreeMap<&str, (usize, Option<&str>)> = BTreeMap::new();
        for action in &self.actions {
            if !action.success {
                if let Some(selector) = action.selector.as_deref() {
                    let entry = counts.entry(selector).or_insert((0, None));
                    entry.0 += 1;
                    entry.1 = action.error_message.as_deref();
                }
            }
        }
        counts
            .into_iter()
            .map(|(selector, (count, error))| {
                let short: String = selector.chars().take(40).collect();
                let mut hint = format!("'{short}' FAILED {count}x");
                if let Some(error) = error {
                    let snippet: String = error.chars().take(50).collect();
                    hint.push_str(&format!(": {snippet}"));
                }
                hint
            })
            .collect()
    }

    /// Evidence that a submit was at least attempted (P1).
    #[must_use]
    pub fn has_submit_evidence(&self) -> bool {
        self.form_submitted || self.submit_attempts > 0 || self.click_attempts_after_fill > 0
    }
}
