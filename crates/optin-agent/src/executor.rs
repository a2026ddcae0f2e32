//! Action execution against the page.
//!
//! One entry point, [`Executor::execute`], performs a planned action with
//! fallback selector strategies, hidden-checkbox handling, submit
//! classification, active-form tracking and post-click settle waits.

use crate::overlay::{self, OverlayOutcome};
use crate::selector;
use crate::state::AgentState;
use optin_browser::page::settle_after_click;
use optin_browser::{scripts, PageDriver};
use optin_core::snapshot::SUBMIT_KEYWORDS;
use optin_core::{ActionKind, FieldType, PlannedAction};
use optin_llm::ActiveFormContext;
use std::time::Duration;
use tokio::time::sleep;

const ATTACH_WAIT: Duration = Duration::from_secs(5);
const CLICK_WAIT: Duration = Duration::from_secs(3);

/// Result of executing one action.
#[derive(Debug, Default)]
pub struct ExecOutcome {
    /// Whether the action succeeded
    pub success: bool,
    /// Raw error text on failure (humanised by the caller)
    pub error: Option<String>,
    /// A blocking overlay turned out to be a success popup
    pub overlay_success: Option<String>,
    /// A blocking overlay contains a CAPTCHA
    pub needs_captcha: bool,
}

impl ExecOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// How a click classifies before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickClass {
    /// Counts as a real form submit
    pub is_real_submit: bool,
    /// Reads as a navigation CTA
    pub is_cta: bool,
}

// CTA verbs for click classification, matched at word start in the combined
// selector + reasoning text.
const CLICK_CTA_VERBS: &[&str] = &[
    "try", "get", "start", "begin", "discover", "explore", "learn", "see", "watch", "view",
    "find", "request", "book", "schedule", "contact", "connect", "launch", "unlock", "grab",
    "claim", "access",
];
const CLICK_CTA_URGENCY: &[&str] = &["now", "today", "free", "instant", "demo", "trial", "more"];

/// Classify a click as real submit vs CTA.
///
/// A click is a real submit iff the selector/reasoning carries a submit
/// keyword, at least one field has been filled, the selector is not a
/// radio/checkbox, and the click does not score as a pure CTA.
#[must_use]
pub fn classify_click(selector: &str, reasoning: &str, fields_filled: usize) -> ClickClass {
    let combined = format!("{} {}", selector.to_lowercase(), reasoning.to_lowercase());

    let mut cta_score = 0i32;
    for verb in CLICK_CTA_VERBS {
        if combined
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word.starts_with(verb))
        {
            cta_score += 2;
        }
    }
    for word in CLICK_CTA_URGENCY {
        if combined.contains(word) {
            cta_score += 1;
        }
    }
    let is_cta = cta_score >= 2;

    let is_submit_keyword = SUBMIT_KEYWORDS
        .iter()
        .chain(["create account", "create"].iter())
        .any(|kw| combined.contains(kw));
    let is_toggle = selector::is_radio_or_checkbox_selector(selector);

    ClickClass {
        is_real_submit: is_submit_keyword && fields_filled > 0 && !is_cta && !is_toggle,
        is_cta,
    }
}

/// Lenient comparison for phone inputs: masks routinely reformat the typed
/// digits, so accept any overlap or a filled field with 7+ digits.
#[must_use]
pub fn phone_value_matches(typed: &str, read_back: &str) -> bool {
    let typed_digits: String = typed.chars().filter(char::is_ascii_digit).collect();
    let filled_digits: String = read_back.chars().filter(char::is_ascii_digit).collect();
    if typed_digits.is_empty() || filled_digits.is_empty() {
        return false;
    }
    filled_digits.contains(&typed_digits)
        || typed_digits.contains(&filled_digits)
        || filled_digits.len() >= 7
}

/// Friendly field name for humanised errors.
#[must_use]
pub fn friendly_field_name(field_type: Option<FieldType>, selector: Option<&str>) -> String {
    if let Some(ft) = field_type {
        if ft != FieldType::Other {
            return ft.friendly_name().to_string();
        }
    }
    if let Some(selector) = selector {
        let lower = selector.to_lowercase();
        let patterns: &[(&[&str], &str)] = &[
            (&["email", "e-mail"], "Email"),
            (&["first_name", "firstname", "first-name", "fname"], "First Name"),
            (&["last_name", "lastname", "last-name", "lname"], "Last Name"),
            (&["full_name", "fullname", "full-name"], "Full Name"),
            (&["phone", "mobile", "tel"], "Phone Number"),
            (&["country"], "Country"),
            (&["checkbox", "terms", "agree", "consent", "privacy"], "Checkbox"),
            (&["password"], "Password"),
            (&["company", "organization"], "Company"),
            (&["name"], "Name"),
        ];
        for (needles, name) in patterns {
            if needles.iter().any(|n| lower.contains(n)) {
                return (*name).to_string();
            }
        }
    }
    "form field".to_string()
}

/// Friendly button name for humanised errors.
#[must_use]
pub fn friendly_button_name(selector: Option<&str>, reasoning: &str) -> String {
    if let Some(selector) = selector {
        let lower = selector.to_lowercase();
        let patterns: &[(&[&str], &str)] = &[
            (&["submit"], "Submit button"),
            (&["sign-up", "signup", "sign_up"], "Sign Up button"),
            (&["subscribe"], "Subscribe button"),
            (&["register"], "Register button"),
            (&["continue"], "Continue button"),
            (&["next"], "Next button"),
            (&["send"], "Send button"),
            (&["join"], "Join button"),
            (&["get-started", "get_started", "getstarted"], "Get Started button"),
            (&["country", "flag", "dial"], "Country selector"),
        ];
        for (needles, name) in patterns {
            if needles.iter().any(|n| lower.contains(n)) {
                return (*name).to_string();
            }
        }
    }
    let reasoning = reasoning.to_lowercase();
    if reasoning.contains("submit") {
        return "Submit button".to_string();
    }
    if reasoning.contains("country") || reasoning.contains("code") {
        return "Country selector".to_string();
    }
    "button".to_string()
}

/// Turn a raw execution error into the sentence users see.
#[must_use]
pub fn humanize_error(error: &str, action: &PlannedAction) -> String {
    let lower = error.to_lowercase();
    let field = friendly_field_name(action.field_type, action.selector.as_deref());
    let button = friendly_button_name(action.selector.as_deref(), &action.reasoning);
    let selector_snippet: String = action
        .selector
        .as_deref()
        .unwrap_or("unknown")
        .chars()
        .take(50)
        .collect();

    if lower.contains("timeout") || lower.contains("not found") || lower.contains("waiting for") {
        return match action.kind {
            ActionKind::FillField => format!("Failed to fill {field}: Field not found on page"),
            ActionKind::Click => format!("Failed to click {button}: Button not found on page"),
            _ => format!("Element not found: {selector_snippet}"),
        };
    }
    if lower.contains("hidden") || lower.contains("not visible") {
        return match action.kind {
            ActionKind::FillField => {
                format!("Failed to fill {field}: Field is hidden or covered by another element")
            }
            ActionKind::Click => format!("Failed to click {button}: Button is hidden or covered"),
            _ => format!("Element is hidden: {selector_snippet}"),
        };
    }
    if lower.contains("not a valid selector") || lower.contains("invalid selector") {
        return format!("Failed to fill {field}: Could not locate field (invalid selector)");
    }
    if lower.contains("verification failed") || lower.contains("value mismatch") {
        return format!("Failed to fill {field}: Field rejected the input value");
    }
    if lower.contains("invalid") || lower.contains("required") || lower.contains("please enter") {
        let snippet: String = error.chars().take(60).collect();
        return format!("Form rejected {field}: {snippet}");
    }
    if lower.contains("network") || lower.contains("connection") {
        return format!("Network error while filling {field}");
    }
    if lower.contains("captcha") {
        return "CAPTCHA is blocking form submission".to_string();
    }
    if lower.contains("intercept") || lower.contains("another element") {
        return match action.kind {
            ActionKind::Click => format!("Failed to click {button}: Blocked by popup or overlay"),
            _ => format!("Click blocked by overlay while interacting with {field}"),
        };
    }

    let clean: String = error.replace('\n', " ").chars().take(80).collect();
    match action.kind {
        ActionKind::FillField => format!("Failed to fill {field}: {clean}"),
        ActionKind::Click => format!("Failed to click {button}: {clean}"),
        _ => clean,
    }
}

/// Executes planned actions against one page.
pub struct Executor<'a> {
    driver: &'a dyn PageDriver,
}

impl<'a> Executor<'a> {
    /// Executor over the given driver.
    #[must_use]
    pub fn new(driver: &'a dyn PageDriver) -> Self {
        Self { driver }
    }

    /// Execute one action, updating the submit/fill bookkeeping in `state`.
    pub async fn execute(&self, state: &mut AgentState, action: &PlannedAction) -> ExecOutcome {
        match action.kind {
            ActionKind::FillField => self.execute_fill(state, action).await,
            ActionKind::Click => self.execute_click(state, action).await,
            ActionKind::Scroll => match self.driver.scroll_viewport().await {
                Ok(()) => ExecOutcome::ok(),
                Err(e) => ExecOutcome::fail(e.to_string()),
            },
            ActionKind::Wait => {
                let seconds = action
                    .value
                    .as_deref()
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(2.0);
                sleep(Duration::from_secs_f64(seconds.clamp(0.0, 30.0))).await;
                ExecOutcome::ok()
            }
            ActionKind::Complete => ExecOutcome::ok(),
        }
    }

    async fn element_kind(&self, sel: &str) -> Option<(String, String)> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); \
             return el ? {{ tag: el.tagName, type: el.type || '' }} : null; }})()",
            scripts::js_string(sel)
        );
        let value = self.driver.eval_json(&script).await.ok()?;
        let tag = value.get("tag")?.as_str()?.to_string();
        let kind = value
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Some((tag, kind))
    }

    // Re-resolve the filled element's ancestor form; the DOM may have
    // mutated since observation.
    async fn track_active_form(&self, state: &mut AgentState, sel: &str) {
        let script =
            scripts::ACTIVE_FORM_CONTEXT.replace("__SELECTOR__", &scripts::js_string(sel));
        if let Ok(value) = self.driver.eval_json(&script).await {
            if let (Some(form_id), Some(form_selector)) = (
                value.get("formId").and_then(|v| v.as_str()),
                value.get("formSelector").and_then(|v| v.as_str()),
            ) {
                let submit_selector = value
                    .get("submitSelector")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                tracing::debug!("Active form: {form_id} (submit: {submit_selector:?})");
                state.active_form = Some(ActiveFormContext {
                    form_id: form_id.to_string(),
                    form_selector: form_selector.to_string(),
                    submit_selector,
                });
            }
        }
    }

    async fn execute_fill(&self, state: &mut AgentState, action: &PlannedAction) -> ExecOutcome {
        let Some(raw_selector) = action.selector.as_deref() else {
            return ExecOutcome::fail("Missing selector");
        };
        let Some(value) = action.value.as_deref() else {
            return ExecOutcome::fail("Missing value");
        };
        let sel = selector::normalize_contains(raw_selector);

        // Hidden checkboxes are attached but invisible, so wait for
        // attachment only.
        match self.driver.wait_for_attached(&sel, ATTACH_WAIT).await {
            Ok(true) => {}
            Ok(false) => return ExecOutcome::fail(format!("Element not found: {raw_selector}")),
            Err(e) => return ExecOutcome::fail(e.to_string()),
        }

        self.track_active_form(state, &sel).await;

        let (tag, input_type) = self
            .element_kind(&sel)
            .await
            .unwrap_or_else(|| ("INPUT".to_string(), String::new()));

        if tag == "SELECT" {
            return match self.driver.select_option(&sel, value).await {
                Ok(true) => ExecOutcome::ok(),
                Ok(false) => ExecOutcome::fail("Could not select option"),
                Err(e) => ExecOutcome::fail(e.to_string()),
            };
        }

        if input_type == "checkbox" || input_type == "radio" {
            return self.fill_checkbox(&sel, value).await;
        }

        let visible = self.driver.is_visible(&sel).await.unwrap_or(false);
        if !visible {
            return ExecOutcome::fail("Element not visible");
        }

        let read_back = match self.driver.fill_text(&sel, value).await {
            Ok(read_back) => read_back,
            Err(e) => return ExecOutcome::fail(e.to_string()),
        };
        sleep(Duration::from_millis(500)).await;

        if read_back == value {
            return ExecOutcome::ok();
        }
        let is_phone = input_type == "tel"
            || action.field_type == Some(FieldType::Phone)
            || ["phone", "tel", "mobile"]
                .iter()
                .any(|w| sel.to_lowercase().contains(w));
        if is_phone && phone_value_matches(value, &read_back) {
            tracing::debug!("Phone mask reformatted '{value}' to '{read_back}'");
            return ExecOutcome::ok();
        }
        ExecOutcome::fail("Value verification failed")
    }

    async fn fill_checkbox(&self, sel: &str, value: &str) -> ExecOutcome {
        let want = matches!(value.to_lowercase().as_str(), "true" | "yes" | "1" | "on");
        let visible = self.driver.is_visible(sel).await.unwrap_or(false);

        if visible {
            return match self.driver.set_checked(sel, want).await {
                Ok(now) if now == want => ExecOutcome::ok(),
                Ok(_) => ExecOutcome::fail("Checkbox did not reach the requested state"),
                Err(e) => ExecOutcome::fail(e.to_string()),
            };
        }

        // Hidden (sr-only) checkbox: wrapping label, label[for], then a
        // forced property write with synthesized events.
        tracing::debug!("Hidden checkbox {sel}, using label strategies");
        let script = scripts::FORCE_CHECKBOX
            .replace("__SELECTOR__", &scripts::js_string(sel))
            .replace("__CHECKED__", if want { "true" } else { "false" });
        match self.driver.eval_json(&script).await {
            Ok(serde_json::Value::Bool(now)) if now == want => ExecOutcome::ok(),
            Ok(serde_json::Value::Bool(_)) => {
                // State uncertain after all strategies; treat as processed
                ExecOutcome::ok()
            }
            Ok(serde_json::Value::Null) => ExecOutcome::fail(format!("Element not found: {sel}")),
            Ok(_) => ExecOutcome::ok(),
            Err(e) => ExecOutcome::fail(format!("Hidden checkbox error: {e}")),
        }
    }

    async fn try_click_selector(&self, sel: &str) -> bool {
        match self.driver.wait_for_attached(sel, CLICK_WAIT).await {
            Ok(true) => self.driver.click(sel).await.is_ok(),
            _ => false,
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn execute_click(&self, state: &mut AgentState, action: &PlannedAction) -> ExecOutcome {
        let Some(raw_selector) = action.selector.as_deref() else {
            return ExecOutcome::fail("Missing selector");
        };

        let click = classify_click(raw_selector, &action.reasoning, state.fields_filled.len());
        if !state.fields_filled.is_empty() {
            // Any click after filling may be a non-keyworded submit
            state.click_attempts_after_fill += 1;
        }

        let url_before = self.driver.current_url().await.unwrap_or_default();
        if click.is_real_submit {
            state.url_before_submit = Some(url_before.clone());
            state.form_count_before_submit = self
                .driver
                .eval_json("document.querySelectorAll('form').length")
                .await
                .ok()
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize;
            self.driver.reset_network_success();
        }

        // Strategy 0: the active form's own submit button first
        if click.is_real_submit {
            if let Some(submit_sel) = state
                .active_form
                .as_ref()
                .and_then(|f| f.submit_selector.clone())
            {
                let normalized = selector::normalize_contains(&submit_sel);
                if self.try_click_with_text_fallback(&normalized).await {
                    tracing::debug!("Clicked active form submit: {submit_sel}");
                    state.record_real_submit();
                    settle_after_click(self.driver, &url_before, false).await;
                    return ExecOutcome::ok();
                }
            }
        }

        // Strategy 1: the literal selector
        if self.try_click_selector(raw_selector).await {
            if click.is_real_submit {
                state.record_real_submit();
            }
            settle_after_click(self.driver, &url_before, click.is_cta).await;
            return ExecOutcome::ok();
        }

        // Strategy 2: the parsed selector (:contains / :has-text rewrite)
        let parsed = selector::normalize_contains(raw_selector);
        if parsed != raw_selector && self.try_click_with_text_fallback(&parsed).await {
            if click.is_real_submit {
                state.record_real_submit();
            }
            settle_after_click(self.driver, &url_before, click.is_cta).await;
            return ExecOutcome::ok();
        }
        if selector::text_of(raw_selector).is_some()
            && self.try_click_with_text_fallback(raw_selector).await
        {
            if click.is_real_submit {
                state.record_real_submit();
            }
            settle_after_click(self.driver, &url_before, click.is_cta).await;
            return ExecOutcome::ok();
        }

        // Strategy 3: text search across clickable tags
        if let Some(text) = quoted_text(raw_selector) {
            for tag in ["button", "a", "div", "span"] {
                if self.driver.click_text(tag, &text).await.is_ok() {
                    tracing::debug!("Clicked {tag} with text '{text}'");
                    if click.is_real_submit {
                        state.record_real_submit();
                    }
                    settle_after_click(self.driver, &url_before, click.is_cta).await;
                    return ExecOutcome::ok();
                }
            }
        }

        // Strategy 4: simplified class selector
        if let Some(simplified) = simplify_class_selector(raw_selector) {
            if self.try_click_selector(&simplified).await {
                tracing::debug!("Clicked simplified selector {simplified}");
                if click.is_real_submit {
                    state.record_real_submit();
                }
                settle_after_click(self.driver, &url_before, click.is_cta).await;
                return ExecOutcome::ok();
            }
        }

        // All strategies failed. After a submit this is often a blocking
        // overlay; classify it before declaring failure.
        if state.form_submitted && state.submit_attempts > 0 {
            match overlay::check_and_handle(self.driver, true).await {
                OverlayOutcome::Success(reason) => {
                    return ExecOutcome {
                        success: true,
                        error: None,
                        overlay_success: Some(reason),
                        needs_captcha: false,
                    }
                }
                OverlayOutcome::NeedsCaptcha => {
                    return ExecOutcome {
                        success: false,
                        error: Some("CAPTCHA overlay is blocking the click".to_string()),
                        overlay_success: None,
                        needs_captcha: true,
                    }
                }
                OverlayOutcome::Closed => {
                    if self.try_click_selector(raw_selector).await {
                        tracing::debug!("Click succeeded after closing overlay");
                        return ExecOutcome::ok();
                    }
                }
                _ => {}
            }
        }

        ExecOutcome::fail(format!(
            "Could not click: {}",
            raw_selector.chars().take(50).collect::<String>()
        ))
    }

    // Click a selector that may carry a :has-text part: try the base
    // selector, then the text strategy.
    async fn try_click_with_text_fallback(&self, sel: &str) -> bool {
        if let Some(text) = selector::text_of(sel) {
            let base: String = sel
                .split(":has-text")
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            let tag = base
                .rsplit(|c: char| c == ' ' || c == '>')
                .next()
                .filter(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_alphanumeric()))
                .unwrap_or("button")
                .to_string();
            return self.driver.click_text(&tag, &text).await.is_ok();
        }
        self.try_click_selector(sel).await
    }
}

fn quoted_text(selector: &str) -> Option<String> {
    let start = selector.find(['\'', '"'])?;
    let quote = selector.as_bytes()[start] as char;
    let rest = &selector[start + 1..];
    let end = rest.find(quote)?;
    let text = &rest[..end];
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn simplify_class_selector(selector: &str) -> Option<String> {
    if !selector.contains('.') || selector.starts_with('#') {
        return None;
    }
    let mut parts = selector.split('.');
    let tag = parts.next().unwrap_or("");
    let tag = if tag.is_empty() { "div" } else { tag };
    let classes: Vec<&str> = parts.take(2).collect();
    if classes.is_empty() {
        return None;
    }
    Some(format!("{tag}.{}", classes.join(".")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_click_requires_filled_fields() {
        // You cannot submit before filling (L3)
        let class = classify_click("button:has-text('Sign Up')", "submit the form", 0);
        assert!(!class.is_real_submit);

        let class = classify_click("button:has-text('Sign Up')", "submit the form", 1);
        assert!(class.is_real_submit);
    }

    #[test]
    fn test_classify_click_radio_checkbox_never_submits() {
        let class = classify_click("input[type='checkbox']", "submit agreement", 2);
        assert!(!class.is_real_submit);
        let class = classify_click("input[type=\"radio\"]", "subscribe option", 2);
        assert!(!class.is_real_submit);
    }

    #[test]
    fn test_classify_click_cta_not_submit() {
        let class = classify_click("a:has-text('Try Free Now')", "click CTA to reveal form", 1);
        assert!(class.is_cta);
        assert!(!class.is_real_submit);
    }

    #[test]
    fn test_classify_click_plain_submit() {
        let class = classify_click("#newsletter-submit", "submit newsletter subscription", 1);
        assert!(class.is_real_submit);
        assert!(!class.is_cta);
    }

    #[test]
    fn test_phone_lenient_match() {
        assert!(phone_value_matches("2025550123", "(202) 555-0123"));
        assert!(phone_value_matches("2025550123", "+1 202 555 0123"));
        // Field holds 7+ digits even if they diverge
        assert!(phone_value_matches("2025550123", "12025550123"));
        assert!(!phone_value_matches("2025550123", ""));
        assert!(!phone_value_matches("2025550123", "abc"));
    }

    #[test]
    fn test_friendly_names() {
        assert_eq!(
            friendly_field_name(Some(FieldType::Email), None),
            "Email"
        );
        assert_eq!(
            friendly_field_name(None, Some("[name='phoneNumber']")),
            "Phone Number"
        );
        assert_eq!(friendly_field_name(None, Some("#weird")), "form field");
        assert_eq!(
            friendly_button_name(Some("button.signup-btn"), ""),
            "Sign Up button"
        );
        assert_eq!(friendly_button_name(Some("#x"), "submit the form"), "Submit button");
    }

    #[test]
    fn test_humanize_not_found() {
        let action = PlannedAction::fill("#email", FieldType::Email, "x@y.z", "fill email");
        assert_eq!(
            humanize_error("Timeout 5000ms waiting for selector", &action),
            "Failed to fill Email: Field not found on page"
        );
    }

    #[test]
    fn test_humanize_hidden_click() {
        let action = PlannedAction::click("button.subscribe", "submit");
        assert_eq!(
            humanize_error("element is hidden", &action),
            "Failed to click Subscribe button: Button is hidden or covered"
        );
    }

    #[test]
    fn test_humanize_captcha() {
        let action = PlannedAction::click("#go", "submit");
        assert_eq!(
            humanize_error("recaptcha challenge active", &action),
            "CAPTCHA is blocking form submission"
        );
    }

    #[test]
    fn test_quoted_text_extraction() {
        assert_eq!(
            quoted_text("button:has-text('Sign Up')").as_deref(),
            Some("Sign Up")
        );
        assert_eq!(quoted_text("#plain"), None);
    }

    #[test]
    fn test_simplify_class_selector() {
        assert_eq!(
            simplify_class_selector("button.btn.btn-primary.large").as_deref(),
            Some("button.btn.btn-primary")
        );
        assert_eq!(
            simplify_class_selector(".hero-cta").as_deref(),
            Some("div.hero-cta")
        );
        assert_eq!(simplify_class_selector("#id"), None);
        assert_eq!(simplify_class_selector("button"), None);
    }
}
