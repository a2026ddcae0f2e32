//! The three planner operations: stepwise next action, batch plan, and
//! post-submit verification.

use crate::client::{ChatClient, UserContent, Usage};
use crate::cost::CostTracker;
use crate::error::{LlmError, Result};
use crate::prompt;
use async_trait::async_trait;
use optin_core::{ButtonDescriptor, Credentials, InputDescriptor};
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// System prompt shared by every planner call.
pub const SYSTEM_PROMPT: &str = "You are a web automation agent. Analyze pages and return only \
     valid JSON responses. Be precise with selectors.";

/// The form whose input was most recently filled.
#[derive(Debug, Clone)]
pub struct ActiveFormContext {
    /// Stable form id
    pub form_id: String,
    /// Selector of the form element
    pub form_selector: String,
    /// Resolved submit selector, when one was found
    pub submit_selector: Option<String>,
}

/// The most recent action, summarised for the prompt.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Action kind string
    pub kind: String,
    /// Target selector
    pub selector: String,
    /// Whether it succeeded
    pub success: bool,
    /// Humanised error on failure
    pub error: Option<String>,
}

/// Everything the stepwise planner sees for one decision.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Signup credentials (values only)
    pub credentials: Credentials,
    /// Current step (1-based)
    pub current_step: u32,
    /// Step budget
    pub max_steps: u32,
    /// Current page URL
    pub page_url: String,
    /// Visible inputs
    pub inputs: Vec<InputDescriptor>,
    /// Visible buttons
    pub buttons: Vec<ButtonDescriptor>,
    /// Page text sample (≤ ~500 chars)
    pub page_text_sample: String,
    /// Selectors already filled
    pub fields_filled: Vec<String>,
    /// Field types already filled
    pub field_types_filled: Vec<String>,
    /// Checkboxes already checked
    pub checkboxes_checked: usize,
    /// Validation errors visible on the page
    pub error_messages: Vec<String>,
    /// The last five actions, oldest first
    pub history: Vec<HistoryEntry>,
    /// Per-selector failure hints
    pub failed_selector_hints: Vec<String>,
    /// Selectors verified to not exist (≤ 10 sent)
    pub non_existent_selectors: Vec<String>,
    /// Dial code detected on the page
    pub detected_country_code: Option<String>,
    /// Active form context
    pub active_form: Option<ActiveFormContext>,
    /// Oracle already sees a success indicator
    pub has_success_indicator: bool,
    /// Classifier's confirmation that a signup form exists (reason text)
    pub signup_form_confirmed: Option<String>,
    /// Full-page screenshot for vision steps
    pub screenshot_base64: Option<String>,
}

/// Context for a one-shot batch plan.
#[derive(Debug, Clone)]
pub struct BatchContext {
    /// Signup credentials
    pub credentials: Credentials,
    /// Current page URL
    pub page_url: String,
    /// Simplified HTML of the page's visible forms
    pub simplified_html: String,
}

/// Context for post-submit verification.
#[derive(Debug, Clone)]
pub struct VerifyContext {
    /// Selectors that were filled
    pub fields_filled: Vec<String>,
    /// Summary strings of actions taken
    pub actions_taken: Vec<String>,
    /// Simplified HTML of the current page
    pub simplified_html: String,
    /// Current page URL
    pub page_url: String,
    /// Visible text of the current page
    pub visible_text: String,
    /// A POST/PUT with 2xx was observed after the submit click
    pub network_success: bool,
    /// Reason for re-prompting (hallucinated follow-up plan)
    pub retry_reason: Option<String>,
}

/// One planner decision as returned over the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerDecision {
    /// Action kind string (fill_field, click, scroll, wait, complete)
    #[serde(default)]
    pub action: String,
    /// Target selector
    #[serde(default)]
    pub selector: Option<String>,
    /// Logical field type for fills
    #[serde(default)]
    pub field_type: Option<String>,
    /// Raw value (string, bool or number depending on the model's mood)
    #[serde(default)]
    pub value: Option<Value>,
    /// Ask the engine to synthesise a phone for the detected country
    #[serde(default)]
    pub use_phone_number_only: bool,
    /// Model's stated reason
    #[serde(default)]
    pub reasoning: String,
}

impl PlannerDecision {
    /// The value coerced to a string, if any.
    #[must_use]
    pub fn value_str(&self) -> Option<String> {
        match &self.value {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Synthetic `complete` decision used by preflight short-circuits.
    #[must_use]
    pub fn complete(reasoning: impl Into<String>) -> Self {
        Self {
            action: "complete".to_string(),
            selector: None,
            field_type: None,
            value: None,
            use_phone_number_only: false,
            reasoning: reasoning.into(),
        }
    }
}

/// A validated batch plan.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    /// Planned actions in execution order
    pub actions: Vec<PlannerDecision>,
    /// Plan-level reasoning
    pub reasoning: String,
    /// The preflight or the model concluded there is no signup form
    pub no_form: bool,
}

/// Post-submit verdict.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Submission confirmed
    Success {
        /// Model confidence 0–1
        confidence: f64,
        /// Verdict reasoning
        reasoning: String,
    },
    /// A second step needs the provided actions
    NeedsMoreActions {
        /// Follow-up actions (selector-validated by the guard before use)
        actions: Vec<PlannerDecision>,
        /// Verdict reasoning
        reasoning: String,
    },
    /// The form rejected the input
    ValidationError {
        /// Verdict reasoning
        reasoning: String,
    },
    /// No evidence of success
    Failed {
        /// Verdict reasoning
        reasoning: String,
    },
}

/// Planner seam consumed by the agent loop; the production implementation
/// talks to the chat endpoint, tests substitute scripted planners.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Decide the single next action for the current page state.
    async fn next_action(&self, ctx: &StepContext) -> Result<PlannerDecision>;

    /// Plan the whole form from one HTML snapshot.
    async fn batch_plan(&self, ctx: &BatchContext) -> Result<BatchPlan>;

    /// Classify the post-submit page.
    async fn verify(&self, ctx: &VerifyContext) -> Result<Verdict>;
}

/// Preflight filter for batch planning: plans that need no LLM call at all.
///
/// Skips the call when the simplified HTML is minimal, has no fillable
/// text-type input and no email-named input, or contains only a search form.
#[must_use]
pub fn batch_preflight(simplified_html: &str) -> Option<BatchPlan> {
    let html_lower = simplified_html.to_lowercase();

    if simplified_html.len() < 50 {
        return Some(BatchPlan {
            actions: vec![PlannerDecision::complete(
                "No signup form - page has minimal content",
            )],
            reasoning: "HTML content too minimal".to_string(),
            no_form: true,
        });
    }

    let has_textarea = html_lower.contains("<textarea");
    let has_fillable_type = ["email", "text", "tel", "password"].iter().any(|t| {
        html_lower.contains(&format!("type=\"{t}\"")) || html_lower.contains(&format!("type='{t}'"))
    });
    let has_email_named = html_lower.contains("name=\"email\"")
        || html_lower.contains("name='email'")
        || html_lower.contains("placeholder=\"email")
        || html_lower.contains("placeholder='email")
        || html_lower.contains("placeholder=\"your email")
        || html_lower.contains("placeholder=\"enter email")
        || html_lower.contains("placeholder=\"e-mail");

    if !has_textarea && !has_fillable_type && !has_email_named {
        return Some(BatchPlan {
            actions: vec![PlannerDecision::complete(
                "No signup form - no fillable input elements found",
            )],
            reasoning: "No fillable form elements detected in HTML".to_string(),
            no_form: true,
        });
    }

    let has_email_type = html_lower.contains("type=\"email\"") || html_lower.contains("type='email'");
    let is_search_only = (html_lower.contains("action=\"/search\"")
        || html_lower.contains("role=\"search\""))
        && !has_email_type
        && !has_email_named;
    if is_search_only {
        return Some(BatchPlan {
            actions: vec![PlannerDecision::complete("No signup form - only search form")],
            reasoning: "Page only has search forms".to_string(),
            no_form: true,
        });
    }

    None
}

fn decisions_from_value(value: &Value) -> Vec<PlannerDecision> {
    value
        .as_array()
        .map(|actions| {
            actions
                .iter()
                .filter_map(|a| serde_json::from_value::<PlannerDecision>(a.clone()).ok())
                .filter(|a| matches!(a.action.as_str(), "fill_field" | "click" | "complete"))
                .collect()
        })
        .unwrap_or_default()
}

/// Production planner over a [`ChatClient`], accumulating spend into the
/// run's shared [`CostTracker`].
pub struct LlmPlanner {
    client: ChatClient,
    cost: Arc<Mutex<CostTracker>>,
}

impl LlmPlanner {
    /// Create a planner sharing the run's cost tracker.
    #[must_use]
    pub fn new(client: ChatClient, cost: Arc<Mutex<CostTracker>>) -> Self {
        Self { client, cost }
    }

    fn track(&self, usage: Usage) {
        if let Ok(mut tracker) = self.cost.lock() {
            tracker.record(
                self.client.model(),
                usage.prompt_tokens,
                usage.completion_tokens,
            );
        }
    }

    async fn chat(&self, prompt: String, screenshot: Option<String>) -> Result<Value> {
        let content = match screenshot {
            Some(png_base64) => UserContent::TextWithImage {
                text: prompt,
                png_base64,
            },
            None => UserContent::Text(prompt),
        };
        let (value, usage) = self.client.chat_json(SYSTEM_PROMPT, &content).await?;
        self.track(usage);
        Ok(value)
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn next_action(&self, ctx: &StepContext) -> Result<PlannerDecision> {
        let prompt = prompt::stepwise_prompt(ctx);
        let value = self.chat(prompt, ctx.screenshot_base64.clone()).await?;
        let decision: PlannerDecision = serde_json::from_value(value)
            .map_err(|e| LlmError::Parse(format!("bad stepwise decision: {e}")))?;
        if decision.action.is_empty() {
            return Err(LlmError::Parse("decision missing action".to_string()));
        }
        Ok(decision)
    }

    async fn batch_plan(&self, ctx: &BatchContext) -> Result<BatchPlan> {
        if let Some(plan) = batch_preflight(&ctx.simplified_html) {
            tracing::info!("Batch preflight: {} (no LLM call)", plan.reasoning);
            return Ok(plan);
        }

        tracing::info!(
            "Sending HTML to planner ({} chars)",
            ctx.simplified_html.len()
        );
        let prompt = prompt::batch_prompt(ctx);
        let value = self.chat(prompt, None).await?;

        let actions = decisions_from_value(value.get("actions").unwrap_or(&Value::Null));
        let reasoning = value
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let no_form = actions.len() == 1
            && actions[0].action == "complete"
            && actions[0].reasoning.to_lowercase().contains("no signup form");
        tracing::info!("Batch plan: {} actions", actions.len());
        Ok(BatchPlan {
            actions,
            reasoning,
            no_form,
        })
    }

    async fn verify(&self, ctx: &VerifyContext) -> Result<Verdict> {
        let prompt = prompt::verify_prompt(ctx);
        let value = self.chat(prompt, None).await?;

        let reasoning = value
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let confidence = value
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        match value.get("status").and_then(Value::as_str) {
            Some("success") => Ok(Verdict::Success {
                confidence,
                reasoning,
            }),
            Some("needs_more_actions") => Ok(Verdict::NeedsMoreActions {
                actions: decisions_from_value(value.get("next_actions").unwrap_or(&Value::Null)),
                reasoning,
            }),
            Some("validation_error") => Ok(Verdict::ValidationError { reasoning }),
            Some("failed") => Ok(Verdict::Failed { reasoning }),
            other => Err(LlmError::Parse(format!(
                "unknown verification status: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_minimal_html() {
        let plan = batch_preflight("<div></div>").expect("short HTML short-circuits");
        assert!(plan.no_form);
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].action, "complete");
    }

    #[test]
    fn test_preflight_no_fillable_inputs() {
        let html = format!(
            "<form>{}<input type=\"checkbox\" name=\"agree\"><button>Go</button></form>",
            " ".repeat(60)
        );
        let plan = batch_preflight(&html).expect("checkbox-only HTML short-circuits");
        assert!(plan.no_form);
    }

    #[test]
    fn test_preflight_search_only() {
        let html = format!(
            "<form action=\"/search\" role=\"search\">{}<input type=\"text\" name=\"q\"></form>",
            " ".repeat(60)
        );
        // A text input exists but the only form is a search form
        let plan = batch_preflight(&html).expect("search-only HTML short-circuits");
        assert!(plan.no_form);
        assert!(plan.reasoning.contains("search"));
    }

    #[test]
    fn test_preflight_passes_email_form() {
        let html = format!(
            "<form>{}<input type=\"email\" id=\"email\"><button type=\"submit\">Subscribe</button></form>",
            " ".repeat(60)
        );
        assert!(batch_preflight(&html).is_none());
    }

    #[test]
    fn test_preflight_email_named_untyped_input() {
        let html = format!(
            "<form>{}<input name=\"email\" placeholder=\"Email address\"><button>Join</button></form>",
            " ".repeat(60)
        );
        assert!(batch_preflight(&html).is_none());
    }

    #[test]
    fn test_decision_value_coercion() {
        let decision: PlannerDecision =
            serde_json::from_value(serde_json::json!({"action": "fill_field", "value": true}))
                .expect("parse");
        assert_eq!(decision.value_str().as_deref(), Some("true"));

        let decision: PlannerDecision =
            serde_json::from_value(serde_json::json!({"action": "fill_field", "value": "x@y.z"}))
                .expect("parse");
        assert_eq!(decision.value_str().as_deref(), Some("x@y.z"));
    }

    #[test]
    fn test_decisions_filter_unknown_actions() {
        let value = serde_json::json!([
            {"action": "fill_field", "selector": "#email", "field_type": "email"},
            {"action": "navigate", "selector": "#x"},
            {"action": "click", "selector": "#submit"}
        ]);
        let decisions = decisions_from_value(&value);
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].action, "fill_field");
        assert_eq!(decisions[1].action, "click");
    }
}
