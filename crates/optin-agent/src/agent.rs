//! The per-URL agent loop.
//!
//! Composes observer, classifier, planner, guard, executor, oracle and
//! CAPTCHA handler over at most [`MAX_STEPS`] steps, producing one
//! [`Outcome`] per URL. Every suspension point checks the cooperative stop
//! signal; a stop leaves the URL pending with no outcome persisted.

use crate::captcha::{CaptchaHandler, CaptchaOutcome};
use crate::classifier::{self, NavigationContext, PageClass};
use crate::error::{AgentError, Result};
use crate::executor::{humanize_error, Executor};
use crate::guard::{self, SelectorCheck};
use crate::oracle;
use crate::report;
use crate::state::{AgentState, MAX_STEPS, MAX_TOTAL_FAILURES, STEP_PACING_MS};
use base64::Engine as _;
use optin_browser::{observer, scripts, BrowserError, PageDriver};
use optin_core::phone::{extract_dial_code, generate_phone};
use optin_core::{
    ActionKind, ActionRecord, Credentials, ErrorCategory, FieldType, Outcome, OutcomeStatus,
    PageSnapshot, PlannedAction, StopSignal,
};
use optin_llm::{
    BatchContext, HistoryEntry, Planner, PlannerDecision, StepContext, Verdict, VerifyContext,
};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::sleep;

/// Navigation budget per URL.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(45);
/// Verification calls allowed per URL.
const MAX_VERIFY_CALLS: u32 = 2;
/// Navigation buttons tried when a form hides behind a CTA.
const MAX_NAV_BUTTONS: usize = 3;

/// URL fragments that mark cart/checkout/login pages.
const UNWANTED_URL_PATTERNS: &[&str] = &[
    "/cart", "/checkout", "/basket", "/bag", "/login", "/signin", "/auth/login", "/shop/",
    "/orders", "/account/login",
];
/// URL fragments that exempt a page from the unwanted patterns.
const SAFE_URL_PATTERNS: &[&str] = &["/forms/", "/signup/", "/register/"];

/// Agent tunables.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Plan the whole form from one HTML snapshot before stepping
    pub batch_planning: bool,
    /// Step budget per URL
    pub max_steps: u32,
    /// Pacing between steps
    pub step_pacing: Duration,
    /// Pause after navigation before the first observation
    pub settle_pause: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            batch_planning: true,
            max_steps: MAX_STEPS,
            step_pacing: Duration::from_millis(STEP_PACING_MS),
            settle_pause: Duration::from_secs(2),
        }
    }
}

/// Decide whether to attach a screenshot to the stepwise call.
///
/// Vision goes with step 1, after clicks/waits, after failures, and every
/// 5th step; other steps omit the image to save tokens.
#[must_use]
pub fn should_use_vision(step: u32, last_kind: Option<ActionKind>, last_success: bool) -> bool {
    step == 1
        || matches!(last_kind, Some(ActionKind::Click | ActionKind::Wait))
        || !last_success
        || step % 5 == 0
}

fn unwanted_url_pattern(url: &str) -> Option<&'static str> {
    let lower = url.to_lowercase();
    if SAFE_URL_PATTERNS.iter().any(|p| lower.contains(p)) {
        return None;
    }
    UNWANTED_URL_PATTERNS
        .iter()
        .find(|p| lower.contains(*p))
        .copied()
}

fn unwanted_skip_category(reason: &str) -> ErrorCategory {
    let lower = reason.to_lowercase();
    if lower.contains("app store") {
        ErrorCategory::AppStore
    } else if lower.contains("password") || lower.contains("registration") || lower.contains("login")
    {
        ErrorCategory::LoginPage
    } else {
        ErrorCategory::NoForm
    }
}

/// The per-URL signup agent.
pub struct SignupAgent<'a> {
    driver: &'a dyn PageDriver,
    planner: &'a dyn Planner,
    captcha: &'a CaptchaHandler,
    credentials: Credentials,
    stop: StopSignal,
    config: AgentConfig,
}

impl<'a> SignupAgent<'a> {
    /// Assemble an agent over its collaborators.
    #[must_use]
    pub fn new(
        driver: &'a dyn PageDriver,
        planner: &'a dyn Planner,
        captcha: &'a CaptchaHandler,
        credentials: Credentials,
        stop: StopSignal,
        config: AgentConfig,
    ) -> Self {
        Self {
            driver,
            planner,
            captcha,
            credentials,
            stop,
            config,
        }
    }

    /// Process one URL end to end: navigate, classify, run the signup loop.
    ///
    /// # Errors
    /// Returns error only for failures that must stop the run (fatal LLM
    /// errors); everything else becomes an [`Outcome`].
    pub async fn run_url(&self, url: &str) -> Result<Outcome> {
        if self.stop.is_stopped() {
            return Ok(Outcome::interrupted());
        }

        if let Some(domain) = classifier::is_app_store_url(url) {
            return Ok(Outcome::skipped(
                ErrorCategory::AppStore,
                format!("App store URL: {domain}"),
            ));
        }

        tracing::info!("Navigating to {url}");
        if let Err(e) = self.driver.navigate(url, NAVIGATION_TIMEOUT).await {
            if self.stop.is_stopped() {
                return Ok(Outcome::interrupted());
            }
            let reason = match e {
                BrowserError::Navigation(reason) => reason,
                other => other.to_string(),
            };
            return Ok(Outcome::skipped(
                ErrorCategory::LoadError,
                format!("Page failed to load: {reason}"),
            ));
        }

        let landed_url = self.driver.current_url().await.unwrap_or_default();
        if let Some(domain) = classifier::is_app_store_url(&landed_url) {
            return Ok(Outcome::skipped(
                ErrorCategory::AppStore,
                format!("App store redirect: {domain}"),
            ));
        }

        let signup_reason = if self.config.batch_planning {
            // Batch mode skips the slow pre-analysis; the planner decides
            // from HTML and the runtime guards still apply.
            None
        } else {
            match self.classify_and_navigate().await? {
                Ok(reason) => Some(reason),
                Err(outcome) => return Ok(outcome),
            }
        };

        self.execute_signup(signup_reason).await
    }

    // Classify the landed page; click through navigation buttons when the
    // form hides behind one. Ok(reason) continues, Err(outcome) skips.
    async fn classify_and_navigate(&self) -> Result<std::result::Result<String, Outcome>> {
        let snapshot = observer::observe(self.driver).await?;
        let classification = classifier::classify(&snapshot, &NavigationContext::default());

        match classification.class {
            PageClass::Signup { reason } => {
                if classification.has_credit_card_fields {
                    // Re-verify before skipping: pricing mentions on free
                    // signup pages are common false positives
                    let fresh = observer::observe(self.driver).await?;
                    if fresh.signals.has_credit_card_input {
                        return Ok(Err(Outcome::skipped(
                            ErrorCategory::PaymentRequired,
                            "Credit card fields detected in form - only free signups are processed",
                        )));
                    }
                }
                Ok(Ok(reason))
            }
            PageClass::AppStore { matched } => Ok(Err(Outcome::skipped(
                ErrorCategory::AppStore,
                format!("App store page: {matched}"),
            ))),
            PageClass::LoadError { reason } => Ok(Err(Outcome::skipped(
                ErrorCategory::LoadError,
                format!("Page failed to load: {reason}"),
            ))),
            PageClass::LoginOnly { reason } => Ok(Err(Outcome::skipped(
                ErrorCategory::LoginPage,
                format!("Login-only page: {reason}"),
            ))),
            PageClass::BlogArticle { reason } => Ok(Err(Outcome::skipped(
                ErrorCategory::BlogArticle,
                format!("Blog/article page: {reason}"),
            ))),
            PageClass::LandingWithNav { buttons } => {
                tracing::info!("No visible form; trying {} navigation buttons", buttons.len());
                for nav in buttons.iter().take(MAX_NAV_BUTTONS) {
                    if self.stop.is_stopped() {
                        return Ok(Err(Outcome::interrupted()));
                    }
                    tracing::debug!("Trying navigation button: {}", nav.selector);
                    if self.driver.click(&nav.selector).await.is_err() {
                        continue;
                    }
                    sleep(self.config.settle_pause).await;

                    let current = self.driver.current_url().await.unwrap_or_default();
                    if let Some(domain) = classifier::is_app_store_url(&current) {
                        return Ok(Err(Outcome::skipped(
                            ErrorCategory::AppStore,
                            format!("App store redirect: {domain}"),
                        )));
                    }
                    let fresh = observer::observe(self.driver).await?;
                    if let PageClass::Signup { reason } =
                        classifier::classify(&fresh, &NavigationContext::default()).class
                    {
                        tracing::info!("Found signup form after navigation click");
                        return Ok(Ok(reason));
                    }
                }
                Ok(Err(Outcome::skipped(
                    ErrorCategory::NoForm,
                    "No signup form found after navigation",
                )))
            }
            PageClass::LandingNoForm => Ok(Err(Outcome::skipped(
                ErrorCategory::NoForm,
                "Landing page without visible signup form",
            ))),
        }
    }

    // Cart/checkout/product/app-store/account-registration check, by URL,
    // title and page content.
    async fn check_unwanted(&self) -> Option<String> {
        let url = self.driver.current_url().await.unwrap_or_default();
        if let Some(domain) = classifier::is_app_store_url(&url) {
            return Some(format!("App store page detected: {domain}"));
        }
        if let Ok(title) = self.driver.title().await {
            if let Some(pattern) = classifier::is_app_store_title(&title) {
                return Some(format!("App store title detected: {pattern}"));
            }
        }
        if let Some(pattern) = unwanted_url_pattern(&url) {
            return Some(format!("Unwanted URL pattern: {pattern}"));
        }
        match self.driver.eval_json(scripts::UNWANTED_CONTENT_CHECK).await {
            Ok(value) => {
                if value
                    .get("isUnwanted")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false)
                {
                    return value
                        .get("reason")
                        .and_then(|v| v.as_str())
                        .map(String::from);
                }
                None
            }
            Err(_) => None,
        }
    }

    async fn capture_screenshot(&self) -> Option<String> {
        match self.driver.screenshot_png(true).await {
            Ok(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            Err(e) => {
                tracing::debug!("Screenshot failed: {e}");
                None
            }
        }
    }

    fn synth_phone(&self, state: &AgentState) -> String {
        let country = state
            .detected_country_code
            .clone()
            .unwrap_or_else(|| "1".to_string());
        let number = generate_phone(&country, &mut rand::thread_rng());
        tracing::debug!("Synthesised phone for +{country}: {number}");
        number
    }

    // Turn a planner decision into an executable action with resolved
    // values. None means the decision was intercepted (country dropdowns).
    fn normalize_decision(
        &self,
        state: &mut AgentState,
        snapshot: &PageSnapshot,
        decision: PlannerDecision,
    ) -> Option<PlannedAction> {
        let kind = ActionKind::parse(&decision.action)?;

        if kind == ActionKind::Click {
            let combined = format!(
                "{} {}",
                decision.selector.as_deref().unwrap_or_default(),
                decision.reasoning
            )
            .to_lowercase();
            let targets_country = combined.contains("country")
                || combined.contains("dial")
                || combined.contains("flag")
                || extract_dial_code(&combined).is_some();
            if targets_country {
                // Never fight the dropdown: fill the phone with a number
                // matching whatever country is pre-selected.
                state.country_code_attempts += 1;
                state.phone_fallback_used = true;
                tracing::warn!(
                    "Country dropdown click intercepted (attempt {})",
                    state.country_code_attempts
                );
                let phone_selector = phone_input_selector(snapshot);
                let number = self.synth_phone(state);
                return Some(PlannedAction::fill(
                    phone_selector,
                    FieldType::Phone,
                    number,
                    "Using the pre-selected country code with a matching phone number",
                ));
            }
        }

        if kind != ActionKind::FillField {
            let value = decision.value_str();
            return Some(PlannedAction {
                kind,
                selector: decision.selector,
                field_type: None,
                value,
                use_phone_number_only: false,
                reasoning: decision.reasoning,
            });
        }

        let raw_type = decision.field_type.clone().unwrap_or_default();
        if matches!(raw_type.as_str(), "country_code" | "countrycode") {
            state.country_code_attempts += 1;
            tracing::debug!("Skipping country code change request");
            return None;
        }
        let field_type = FieldType::parse(&raw_type);

        let value = match field_type {
            FieldType::Phone => {
                let detected = state.detected_country_code.as_deref().unwrap_or("1");
                if decision.use_phone_number_only
                    || detected != "1"
                    || self.credentials.phone.number.is_empty()
                {
                    self.synth_phone(state)
                } else {
                    self.credentials.phone.number.clone()
                }
            }
            FieldType::Other => decision
                .value_str()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| self.credentials.resolve(FieldType::Other)),
            other => self.credentials.resolve(other),
        };

        Some(PlannedAction {
            kind,
            selector: decision.selector,
            field_type: Some(field_type),
            value: Some(value),
            use_phone_number_only: decision.use_phone_number_only,
            reasoning: decision.reasoning,
        })
    }

    fn build_step_context(
        &self,
        state: &AgentState,
        snapshot: &PageSnapshot,
        signup_reason: Option<&str>,
        screenshot: Option<String>,
    ) -> StepContext {
        let start = state.actions.len().saturating_sub(5);
        let history: Vec<HistoryEntry> = state.actions[start..]
            .iter()
            .map(|a| HistoryEntry {
                kind: a.kind.to_string(),
                selector: a.selector.clone().unwrap_or_default(),
                success: a.success,
                error: a.error_message.clone(),
            })
            .collect();
        StepContext {
            credentials: self.credentials.clone(),
            current_step: state.step,
            max_steps: self.config.max_steps,
            page_url: snapshot.url.clone(),
            inputs: snapshot.inputs.clone(),
            buttons: snapshot.buttons.clone(),
            page_text_sample: snapshot.visible_text.chars().take(500).collect(),
            fields_filled: state.filled_selectors(),
            field_types_filled: state.filled_field_type_names(),
            checkboxes_checked: state.checkboxes_checked.len(),
            error_messages: snapshot.error_messages.clone(),
            history,
            failed_selector_hints: state.failed_selector_hints(),
            non_existent_selectors: state.non_existent_selectors.iter().take(10).cloned().collect(),
            detected_country_code: state.detected_country_code.clone(),
            active_form: state.active_form.clone(),
            has_success_indicator: false,
            signup_form_confirmed: signup_reason.map(String::from),
            screenshot_base64: screenshot,
        }
    }

    // Phone-loop rescue: three phone-flavoured attempts among the last six
    // actions means the planner is stuck; fill deterministically once.
    fn phone_loop_rescue(&self, state: &AgentState, snapshot: &PageSnapshot) -> Option<PlannedAction> {
        if state.is_field_type_filled(FieldType::Phone) {
            return None;
        }
        let recent = state.actions.iter().rev().take(6);
        let phone_attempts = recent
            .filter(|a| {
                let hay = format!(
                    "{} {}",
                    a.selector.as_deref().unwrap_or_default(),
                    a.reasoning
                )
                .to_lowercase();
                hay.contains("phone")
            })
            .count();
        if phone_attempts < 3 {
            return None;
        }
        tracing::warn!("Phone fill loop detected - synthesising a number directly");
        let number = self.synth_phone(state);
        Some(PlannedAction::fill(
            phone_input_selector(snapshot),
            FieldType::Phone,
            number,
            "Auto-generated valid phone for the detected country",
        ))
    }

    fn skip_outcome(
        state: &AgentState,
        category: ErrorCategory,
        reason: impl Into<String>,
    ) -> Outcome {
        Outcome {
            status: OutcomeStatus::Skipped,
            fields_filled: state.filled_selectors(),
            field_types_filled: state.filled_field_type_names(),
            primary_error: Some(reason.into()),
            primary_category: Some(category),
            details: None,
            actions: state.actions.clone(),
            submit_attempts: state.submit_attempts,
            form_submitted: state.form_submitted,
            stuck_loop_detected: state.stuck_loop_detected,
            captcha_attempted: state.captcha_attempted,
            captcha_solved: state.captcha_solved,
            interrupted_by_stop: false,
        }
    }

    fn finalize(&self, mut state: AgentState) -> Outcome {
        state.success = oracle::audit_success(&state);

        if state.success {
            let outcome = Outcome {
                status: OutcomeStatus::Success,
                fields_filled: state.filled_selectors(),
                field_types_filled: state.filled_field_type_names(),
                primary_error: None,
                primary_category: None,
                details: None,
                actions: state.actions.clone(),
                submit_attempts: state.submit_attempts,
                form_submitted: state.form_submitted,
                stuck_loop_detected: state.stuck_loop_detected,
                captcha_attempted: state.captcha_attempted,
                captcha_solved: state.captcha_solved,
                interrupted_by_stop: false,
            };
            tracing::info!(
                "Signup succeeded: {} ({} fields)",
                outcome.signup_type(),
                outcome.fields_filled.len()
            );
            return outcome;
        }

        let failure = report::build_failure_report(&state);
        tracing::warn!("Signup failed: {}", failure.primary_error);
        Outcome {
            status: OutcomeStatus::Failed,
            fields_filled: state.filled_selectors(),
            field_types_filled: state.filled_field_type_names(),
            primary_error: Some(failure.primary_error),
            primary_category: Some(failure.primary_category),
            details: Some(failure.details),
            actions: state.actions.clone(),
            submit_attempts: state.submit_attempts,
            form_submitted: state.form_submitted,
            stuck_loop_detected: state.stuck_loop_detected,
            captcha_attempted: state.captcha_attempted,
            captcha_solved: state.captcha_solved,
            interrupted_by_stop: false,
        }
    }

    /// The main reasoning loop over one page.
    #[allow(clippy::too_many_lines)]
    async fn execute_signup(&self, signup_reason: Option<String>) -> Result<Outcome> {
        let mut state = AgentState::new_for_url();
        let executor = Executor::new(self.driver);
        let mut queue: VecDeque<PlannedAction> = VecDeque::new();
        let mut last_kind: Option<ActionKind> = None;
        let mut last_success = true;
        let mut pending_verification = false;
        let mut verify_calls = 0u32;

        sleep(self.config.settle_pause).await;

        if let Some(reason) = self.check_unwanted().await {
            tracing::warn!("Unwanted page: {reason}");
            return Ok(Self::skip_outcome(
                &state,
                unwanted_skip_category(&reason),
                format!("Unwanted page detected ({reason})"),
            ));
        }

        // Batch mode: one plan up front, validated against the HTML it was
        // derived from, then executed sequentially.
        if self.config.batch_planning {
            let snapshot = observer::observe(self.driver).await?;
            let ctx = BatchContext {
                credentials: self.credentials.clone(),
                page_url: snapshot.url.clone(),
                simplified_html: snapshot.simplified_html.clone(),
            };
            match self.planner.batch_plan(&ctx).await {
                Ok(plan) if plan.no_form => {
                    return Ok(Self::skip_outcome(
                        &state,
                        ErrorCategory::NoForm,
                        plan.reasoning,
                    ));
                }
                Ok(plan) => {
                    let (kept, rejected) =
                        guard::validate_plan(plan.actions, &snapshot.simplified_html);
                    for selector in rejected {
                        tracing::warn!("Batch plan selector rejected: {selector}");
                        state.add_non_existent_selector(&selector);
                    }
                    for decision in kept {
                        if let Some(action) =
                            self.normalize_decision(&mut state, &snapshot, decision)
                        {
                            queue.push_back(action);
                        }
                    }
                }
                Err(e) if e.is_fatal() => return Err(AgentError::Llm(e)),
                Err(e) => {
                    tracing::error!("Batch planning failed: {e}");
                    state.llm_failure_reason = Some(e.to_string());
                    return Ok(self.finalize(state));
                }
            }
        }

        while state.step <= self.config.max_steps {
            if self.stop.is_stopped() {
                tracing::info!("Stop requested - leaving URL pending");
                return Ok(Outcome::interrupted());
            }

            if let Some(reason) = self.check_unwanted().await {
                tracing::warn!("Unwanted page state mid-execution: {reason}");
                return Ok(Self::skip_outcome(
                    &state,
                    unwanted_skip_category(&reason),
                    format!("Navigated to unwanted page: {reason}"),
                ));
            }

            let snapshot = observer::observe(self.driver).await?;
            state.note_error_messages(&snapshot.error_messages);

            let success_check = oracle::detect_success(&snapshot, &state);
            if success_check.is_success && state.has_submit_evidence() {
                tracing::info!("Success detected: {}", success_check.reason);
                state.complete = true;
                state.success = true;
                break;
            }

            // Post-submit overlays: success popups end the URL, CAPTCHA
            // overlays go to the handler, the rest get closed.
            if state.form_submitted && state.submit_attempts > 0 {
                if let Some(overlay) = &snapshot.overlay {
                    match crate::overlay::classify_overlay(overlay, true) {
                        crate::overlay::OverlayOutcome::Success(reason) => {
                            tracing::info!("Success via overlay: {reason}");
                            state.complete = true;
                            state.success = true;
                            break;
                        }
                        crate::overlay::OverlayOutcome::NeedsCaptcha => {
                            if !state.captcha_attempted {
                                state.captcha_attempted = true;
                                let result = self
                                    .captcha
                                    .handle(self.driver, &mut state, &snapshot.captcha)
                                    .await?;
                                if result == CaptchaOutcome::Solved {
                                    continue;
                                }
                            }
                            return Ok(Self::skip_outcome(
                                &state,
                                ErrorCategory::Captcha,
                                "CAPTCHA detected after submission - cannot proceed",
                            ));
                        }
                        crate::overlay::OverlayOutcome::HasError(reason) => {
                            tracing::warn!("Error overlay: {reason}");
                        }
                        crate::overlay::OverlayOutcome::Closed
                        | crate::overlay::OverlayOutcome::None => {
                            let _ = crate::overlay::check_and_handle(self.driver, true).await;
                        }
                    }
                }
            }

            // Proactive CAPTCHA: only confirmed-visible challenges
            if snapshot.captcha.present
                && snapshot.captcha.visible
                && !state.captcha_solved
                && !state.captcha_attempted
            {
                state.captcha_attempted = true;
                let result = self
                    .captcha
                    .handle(self.driver, &mut state, &snapshot.captcha)
                    .await?;
                if result == CaptchaOutcome::Solved {
                    continue;
                }
                tracing::warn!("CAPTCHA unsolved - proceeding anyway");
            }

            // Post-submit verification via the planner
            if pending_verification
                && queue.is_empty()
                && verify_calls < MAX_VERIFY_CALLS
                && !success_check.is_success
            {
                pending_verification = false;
                verify_calls += 1;
                match self.run_verification(&mut state, &snapshot, None).await? {
                    VerifyStep::Done(outcome) => return Ok(outcome),
                    VerifyStep::Success => {
                        state.complete = true;
                        state.success = true;
                        break;
                    }
                    VerifyStep::Queue(actions) => {
                        for action in actions {
                            queue.push_back(action);
                        }
                    }
                    VerifyStep::Continue => {}
                }
            }

            // Give up early when nothing fillable ever appears
            if state.step >= 15 && state.fields_filled.is_empty() && !snapshot.has_fillable_input()
            {
                let has_signup_nav = snapshot.buttons.iter().any(|b| {
                    let text = b.text.to_lowercase();
                    ["sign up", "register", "join", "get started"]
                        .iter()
                        .any(|kw| text.contains(kw))
                });
                if !has_signup_nav {
                    tracing::warn!("No form found after {} steps", state.step);
                    break;
                }
            }

            // Next action: queued batch step, deterministic rescue, or the
            // stepwise planner.
            let action = if let Some(action) = queue.pop_front() {
                Some(action)
            } else if let Some(action) = self.phone_loop_rescue(&state, &snapshot) {
                Some(action)
            } else {
                if self.stop.is_stopped() {
                    return Ok(Outcome::interrupted());
                }
                if let Ok(Some(code)) = observer::detect_country_code(self.driver).await {
                    state.detected_country_code = Some(code);
                }
                let screenshot = if should_use_vision(state.step, last_kind, last_success) {
                    self.capture_screenshot().await
                } else {
                    None
                };
                let mut ctx = self.build_step_context(
                    &state,
                    &snapshot,
                    signup_reason.as_deref(),
                    screenshot,
                );
                ctx.has_success_indicator = success_check.is_success;
                match self.planner.next_action(&ctx).await {
                    Ok(decision) => self.normalize_decision(&mut state, &snapshot, decision),
                    Err(e) if e.is_fatal() => return Err(AgentError::Llm(e)),
                    Err(e) => {
                        tracing::error!("Planner failed: {e}");
                        state.llm_failure_reason = Some(e.to_string());
                        break;
                    }
                }
            };

            let Some(action) = action else {
                // Intercepted decision; take the pacing pause and re-plan
                sleep(self.config.step_pacing).await;
                state.step += 1;
                continue;
            };

            // Hallucination guard before execution (P2)
            if matches!(action.kind, ActionKind::FillField | ActionKind::Click) {
                if let Some(selector) = action.selector.as_deref() {
                    if state.is_blocklisted(selector) {
                        tracing::warn!("Blocklisted selector re-proposed: {selector}");
                        state.add_non_existent_selector(selector);
                        if state.hallucination_count >= 5 {
                            tracing::warn!("Too many hallucinations, giving up");
                            break;
                        }
                        sleep(self.config.step_pacing).await;
                        state.step += 1;
                        continue;
                    }
                    let html = self.driver.content().await.unwrap_or_default();
                    match guard::check_selector(selector, &html, state.form_submitted) {
                        SelectorCheck::Ok => {}
                        SelectorCheck::Hallucinated => {
                            tracing::warn!("Hallucinated selector: {selector}");
                            state.add_non_existent_selector(selector);
                            // Synthetic success: the planner is expected to
                            // try a different selector next step. The value
                            // is cleared so nothing counts as filled.
                            let mut record = ActionRecord::from_planned(&action, true, None);
                            record.value = None;
                            record.reasoning =
                                format!("skipped non-existent selector: {}", record.reasoning);
                            state.record_action(record);
                            if state.hallucination_count >= 5 {
                                tracing::warn!("Too many hallucinations, giving up");
                                break;
                            }
                            sleep(self.config.step_pacing).await;
                            state.step += 1;
                            continue;
                        }
                        SelectorCheck::CloseButtonAfterSubmit => {
                            tracing::debug!("Ignoring close-button attempt after submit");
                            state.add_non_existent_selector(selector);
                            sleep(self.config.step_pacing).await;
                            state.step += 1;
                            continue;
                        }
                    }
                }
            }

            let submits_before = state.submit_attempts;
            let result = executor.execute(&mut state, &action).await;

            if let Some(reason) = result.overlay_success {
                tracing::info!("Success confirmed via overlay: {reason}");
                let record = ActionRecord::from_planned(&action, true, None);
                state.record_action(record);
                state.complete = true;
                state.success = true;
                break;
            }
            if result.needs_captcha && !state.captcha_attempted {
                state.captcha_attempted = true;
                let captcha_probe = observer::observe(self.driver).await?;
                let solved = self
                    .captcha
                    .handle(self.driver, &mut state, &captcha_probe.captcha)
                    .await?;
                if solved == CaptchaOutcome::Solved {
                    continue;
                }
            }

            let humanized = result
                .error
                .as_deref()
                .map(|e| humanize_error(e, &action));
            if let Some(error) = &humanized {
                tracing::warn!("Action failed: {error}");
            }
            let record = ActionRecord::from_planned(&action, result.success, humanized);
            last_kind = Some(action.kind);
            last_success = result.success;
            state.record_action(record);

            if state.submit_attempts > submits_before {
                pending_verification = true;
            }

            if action.kind == ActionKind::Complete && result.success {
                state.complete = true;
                state.success = true;
                break;
            }

            // Loop guard, with an oracle rescue before giving up
            let current_url = self.driver.current_url().await.unwrap_or_default();
            if let Some(stuck) = guard::detect_stuck(&state, &current_url) {
                tracing::warn!("Stuck loop detected: {}", stuck.describe());
                let fresh = observer::observe(self.driver).await?;
                if oracle::rescue_success(&fresh.visible_text, &current_url) {
                    tracing::info!("Stuck loop rescued: page reads as success");
                    state.complete = true;
                    state.success = true;
                    break;
                }
                if stuck.is_captcha_related() && !state.captcha_attempted {
                    state.captcha_attempted = true;
                    let solved = self
                        .captcha
                        .handle(self.driver, &mut state, &fresh.captcha)
                        .await?;
                    if solved == CaptchaOutcome::Solved {
                        continue;
                    }
                }
                state.stuck_loop_detected = true;
                break;
            }

            if !result.success {
                if let Some(selector) = action.selector.as_deref() {
                    if state.selector_failure_count(selector) >= 3 {
                        tracing::warn!(
                            "Selector failed 3 times, a different approach is required: {selector}"
                        );
                    }
                }
                if state.recent_consecutive_failures(3) >= 3
                    && success_check.is_success
                    && state.form_submitted
                    && !state.fields_filled.is_empty()
                {
                    tracing::info!("Success despite failures: {}", success_check.reason);
                    state.complete = true;
                    state.success = true;
                    break;
                }
                if state.total_failures() >= MAX_TOTAL_FAILURES {
                    tracing::warn!("Too many failures ({}), giving up", state.total_failures());
                    break;
                }
            }

            sleep(self.config.step_pacing).await;
            state.step += 1;
        }

        Ok(self.finalize(state))
    }

    async fn run_verification(
        &self,
        state: &mut AgentState,
        snapshot: &PageSnapshot,
        retry_reason: Option<String>,
    ) -> Result<VerifyStep> {
        let ctx = VerifyContext {
            fields_filled: state.filled_selectors(),
            actions_taken: state
                .actions
                .iter()
                .map(|a| {
                    format!(
                        "{} {}",
                        a.kind,
                        a.selector.as_deref().unwrap_or_default()
                    )
                })
                .collect(),
            simplified_html: snapshot.simplified_html.clone(),
            page_url: snapshot.url.clone(),
            visible_text: snapshot.visible_text.clone(),
            network_success: self.driver.network_success_seen(),
            retry_reason,
        };

        let verdict = match self.planner.verify(&ctx).await {
            Ok(verdict) => verdict,
            Err(e) if e.is_fatal() => return Err(AgentError::Llm(e)),
            Err(e) => {
                tracing::warn!("Verification call failed: {e}");
                return Ok(VerifyStep::Continue);
            }
        };

        match verdict {
            Verdict::Success {
                confidence,
                reasoning,
            } => {
                tracing::info!("Verifier: success ({confidence:.2}) - {reasoning}");
                if !state.fields_filled.is_empty() && state.has_submit_evidence() {
                    Ok(VerifyStep::Success)
                } else {
                    // A sales page with nothing filled is not a captured lead
                    Ok(VerifyStep::Continue)
                }
            }
            Verdict::NeedsMoreActions { actions, reasoning } => {
                tracing::info!("Verifier: needs more actions - {reasoning}");
                let (kept, rejected) = guard::validate_plan(actions, &snapshot.simplified_html);
                for selector in &rejected {
                    state.add_non_existent_selector(selector);
                }
                if kept.is_empty() && !rejected.is_empty() {
                    // Hallucinated follow-up; one re-prompt with the reason
                    let retry_ctx = VerifyContext {
                        fields_filled: state.filled_selectors(),
                        actions_taken: Vec::new(),
                        simplified_html: snapshot.simplified_html.clone(),
                        page_url: snapshot.url.clone(),
                        visible_text: snapshot.visible_text.clone(),
                        network_success: self.driver.network_success_seen(),
                        retry_reason: Some(format!(
                            "follow-up selectors not present in the page: {}",
                            rejected.join(", ")
                        )),
                    };
                    let verdict = self.planner.verify(&retry_ctx).await;
                    if let Ok(Verdict::NeedsMoreActions { actions, .. }) = verdict {
                        let (kept, _) = guard::validate_plan(actions, &snapshot.simplified_html);
                        let queued: Vec<PlannedAction> = kept
                            .into_iter()
                            .filter_map(|d| {
                                self.normalize_decision(state, snapshot, d)
                            })
                            .collect();
                        return Ok(VerifyStep::Queue(queued));
                    }
                    return Ok(VerifyStep::Continue);
                }
                let queued: Vec<PlannedAction> = kept
                    .into_iter()
                    .filter_map(|d| self.normalize_decision(state, snapshot, d))
                    .collect();
                Ok(VerifyStep::Queue(queued))
            }
            Verdict::ValidationError { reasoning } => {
                tracing::warn!("Verifier: validation error - {reasoning}");
                let mut outcome = Self::skip_outcome(
                    state,
                    ErrorCategory::Validation,
                    format!("Form rejected input: {reasoning}"),
                );
                outcome.status = OutcomeStatus::Failed;
                Ok(VerifyStep::Done(outcome))
            }
            Verdict::Failed { reasoning } => {
                tracing::warn!("Verifier: failed - {reasoning}");
                state.complete = true;
                state.success = false;
                Ok(VerifyStep::Done(self.finalize(std::mem::take(state))))
            }
        }
    }
}

enum VerifyStep {
    /// Terminal outcome decided by the verifier
    Done(Outcome),
    /// Verifier confirmed success
    Success,
    /// Follow-up actions to execute
    Queue(Vec<PlannedAction>),
    /// Inconclusive; keep looping
    Continue,
}

fn phone_input_selector(snapshot: &PageSnapshot) -> String {
    snapshot
        .inputs
        .iter()
        .find(|i| {
            i.kind == optin_core::InputKind::Tel
                || format!("{}{}", i.name, i.id).to_lowercase().contains("phone")
        })
        .map(|i| i.selector.clone())
        .unwrap_or_else(|| "[name='phoneNumber']".to_string())
}
