//! End-to-end agent loop scenarios over a scripted page and planner.

use async_trait::async_trait;
use optin_agent::{AgentConfig, CaptchaHandler, SignupAgent};
use optin_browser::testing::{ClickEffect, FakePage};
use optin_core::{Credentials, ErrorCategory, OutcomeStatus, Phone, StopSignal};
use optin_llm::{
    BatchContext, BatchPlan, Planner, PlannerDecision, StepContext, Verdict, VerifyContext,
};
use serde_json::{json, Value};
use std::sync::Mutex;

fn credentials() -> Credentials {
    Credentials {
        first_name: "Jane".into(),
        last_name: "Doe".into(),
        email: "x@y.z".into(),
        phone: Phone {
            country_code: "+1".into(),
            number: "2025550123".into(),
        },
    }
}

fn fast_config(batch: bool) -> AgentConfig {
    AgentConfig {
        batch_planning: batch,
        max_steps: 30,
        step_pacing: std::time::Duration::ZERO,
        settle_pause: std::time::Duration::ZERO,
    }
}

// Raw observation payload for a single-email newsletter form.
fn newsletter_observation(url: &str, visible_text: &str) -> Value {
    json!({
        "title": "Acme",
        "url": url,
        "visibleText": visible_text,
        "simplifiedHtml": "<form><input type=\"email\" id=\"email\"><button type=\"submit\">Subscribe</button></form>",
        "formCount": 1,
        "forms": [{
            "index": 0, "id": "", "className": "signup", "action": "/s", "method": "post",
            "inputs": [{
                "type": "email", "tag": "input", "name": "email", "id": "email",
                "placeholder": "Email", "className": "", "ariaLabel": "", "label": "",
                "checked": false, "required": true, "visible": true, "hiddenSrOnly": false,
                "wrappedInLabel": false, "options": [], "formIndex": 0
            }],
            "buttons": [{
                "text": "Subscribe", "type": "submit", "tag": "button", "id": "", "name": "",
                "className": "", "visible": true, "formIndex": 0
            }]
        }],
        "inputs": [{
            "type": "email", "tag": "input", "name": "email", "id": "email",
            "placeholder": "Email", "className": "", "ariaLabel": "", "label": "",
            "checked": false, "required": true, "visible": true, "hiddenSrOnly": false,
            "wrappedInLabel": false, "options": [], "formIndex": 0
        }],
        "buttons": [{
            "text": "Subscribe", "type": "submit", "tag": "button", "id": "", "name": "",
            "className": "", "visible": true, "formIndex": 0
        }],
        "errorMessages": [],
        "captcha": {"found": false, "visible": false, "kind": null, "sitekey": null},
        "overlay": null,
        "login": {},
        "signals": {"hasEmailInput": true, "hasNewsletterText": true}
    })
}

#[derive(Default)]
struct ScriptedPlanner {
    decisions: Mutex<Vec<PlannerDecision>>,
    contexts: Mutex<Vec<StepContext>>,
    batch: Mutex<Option<BatchPlan>>,
    panic_on_call: bool,
}

impl ScriptedPlanner {
    fn stepwise(decisions: Vec<PlannerDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions),
            ..Self::default()
        }
    }

    fn batched(plan: BatchPlan) -> Self {
        Self {
            batch: Mutex::new(Some(plan)),
            ..Self::default()
        }
    }

    fn untouchable() -> Self {
        Self {
            panic_on_call: true,
            ..Self::default()
        }
    }

    fn seen_contexts(&self) -> Vec<StepContext> {
        self.contexts.lock().expect("contexts").clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn next_action(&self, ctx: &StepContext) -> optin_llm::Result<PlannerDecision> {
        assert!(!self.panic_on_call, "planner must not be called");
        self.contexts.lock().expect("contexts").push(ctx.clone());
        let mut decisions = self.decisions.lock().expect("decisions");
        if decisions.is_empty() {
            Ok(PlannerDecision::complete("nothing left to do"))
        } else {
            Ok(decisions.remove(0))
        }
    }

    async fn batch_plan(&self, _ctx: &BatchContext) -> optin_llm::Result<BatchPlan> {
        assert!(!self.panic_on_call, "planner must not be called");
        Ok(self
            .batch
            .lock()
            .expect("batch")
            .take()
            .expect("batch plan consumed once"))
    }

    async fn verify(&self, _ctx: &VerifyContext) -> optin_llm::Result<Verdict> {
        Ok(Verdict::Failed {
            reasoning: "no verification scripted".to_string(),
        })
    }
}

fn decision(value: Value) -> PlannerDecision {
    serde_json::from_value(value).expect("valid decision")
}

// S1: one email field, one Subscribe button, thank-you text after submit.
#[tokio::test(start_paused = true)]
async fn newsletter_happy_path() {
    let page = FakePage::new("about:blank");
    page.set_content(
        "<form><input type=\"email\" id=\"email\"><button type=\"submit\">Subscribe</button></form>",
    );
    page.add_element("#email");
    page.add_element("button:has-text('Subscribe')");
    page.on_click(
        "button:has-text('Subscribe')",
        ClickEffect {
            new_url: Some("https://acme.test/thanks".to_string()),
            network_success: true,
        },
    );

    // Classifier pass, two planning steps, then the success page
    page.push_observation(newsletter_observation("https://acme.test/", "Sign up for our newsletter"));
    page.push_observation(newsletter_observation("https://acme.test/", "Sign up for our newsletter"));
    page.push_observation(newsletter_observation("https://acme.test/", "Sign up for our newsletter"));
    page.push_observation(newsletter_observation(
        "https://acme.test/thanks",
        "Thank you for subscribing.",
    ));

    let planner = ScriptedPlanner::stepwise(vec![
        decision(json!({
            "action": "fill_field", "selector": "#email", "field_type": "email",
            "reasoning": "Fill email field"
        })),
        decision(json!({
            "action": "click", "selector": "button:has-text('Subscribe')",
            "reasoning": "Submit newsletter subscription"
        })),
    ]);
    let captcha = CaptchaHandler::without_solver();
    let agent = SignupAgent::new(
        &page,
        &planner,
        &captcha,
        credentials(),
        StopSignal::new(),
        fast_config(false),
    );

    let outcome = agent.run_url("https://acme.test/").await.expect("run");

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.fields_filled, vec!["#email"]);
    assert_eq!(outcome.submit_attempts, 1);
    assert!(outcome.form_submitted);
    assert!(outcome.primary_error.is_none());
    assert_eq!(outcome.signup_type(), "Newsletter");
    assert_eq!(page.filled().get("#email").map(String::as_str), Some("x@y.z"));
}

// S4: hallucinated selectors are filtered, blocklisted, never executed, and
// five of them end the URL with the selector category.
#[tokio::test(start_paused = true)]
async fn hallucinated_selector_is_blocklisted() {
    let page = FakePage::new("about:blank");
    page.set_content(
        "<form><input type=\"email\" id=\"email\"><button type=\"submit\">Subscribe</button></form>",
    );

    page.push_observation(newsletter_observation("https://acme.test/", "Sign up"));

    let ghost = |n: u32| {
        decision(json!({
            "action": "fill_field", "selector": format!("#TojDQFSj7Qgr64InnMY{n}"),
            "field_type": "full_name", "value": "Jane Doe",
            "reasoning": "Fill the name field"
        }))
    };
    let planner = ScriptedPlanner::stepwise(vec![ghost(0), ghost(1), ghost(2), ghost(3), ghost(4)]);
    let captcha = CaptchaHandler::without_solver();
    let agent = SignupAgent::new(
        &page,
        &planner,
        &captcha,
        credentials(),
        StopSignal::new(),
        fast_config(false),
    );

    let outcome = agent.run_url("https://acme.test/").await.expect("run");

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.primary_category, Some(ErrorCategory::Selector));
    // Nothing was ever filled or clicked
    assert!(page.filled().is_empty());
    assert!(page.clicked().is_empty());
    assert!(outcome.fields_filled.is_empty());

    // P2: later planner calls carry the earlier ghost in the blocklist
    let contexts = planner.seen_contexts();
    assert!(contexts.len() >= 2);
    assert!(contexts[1]
        .non_existent_selectors
        .iter()
        .any(|s| s == "#TojDQFSj7Qgr64InnMY0"));
}

// S5: a visible password without a confirm sibling is an account
// registration page; no LLM call is made (P6).
#[tokio::test(start_paused = true)]
async fn account_registration_skipped_without_llm() {
    let page = FakePage::new("about:blank");
    let mut observation = newsletter_observation("https://acme.test/signup-wall", "Create Account");
    observation["signals"] = json!({
        "hasEmailInput": true,
        "hasPasswordInput": true
    });
    page.push_observation(observation);

    let planner = ScriptedPlanner::untouchable();
    let captcha = CaptchaHandler::without_solver();
    let agent = SignupAgent::new(
        &page,
        &planner,
        &captcha,
        credentials(),
        StopSignal::new(),
        fast_config(false),
    );

    let outcome = agent
        .run_url("https://acme.test/signup-wall")
        .await
        .expect("run");
    assert_eq!(outcome.status, OutcomeStatus::Skipped);
    assert_eq!(outcome.primary_category, Some(ErrorCategory::LoginPage));
}

// S6: a CTA click that lands on an app store skips the URL (P6: still no
// LLM call).
#[tokio::test(start_paused = true)]
async fn app_store_redirect_after_nav_click() {
    let page = FakePage::new("about:blank");
    page.add_element("a.cta");
    page.on_click(
        "a.cta",
        ClickEffect {
            new_url: Some("https://play.google.com/store/apps/details?id=com.acme".to_string()),
            network_success: false,
        },
    );

    let mut observation = newsletter_observation("https://acme.test/", "Get the app");
    observation["forms"] = json!([]);
    observation["inputs"] = json!([]);
    observation["formCount"] = json!(0);
    observation["signals"] = json!({
        "navigationButtons": [{"text": "get started", "selector": "a.cta"}]
    });
    page.push_observation(observation);

    let planner = ScriptedPlanner::untouchable();
    let captcha = CaptchaHandler::without_solver();
    let agent = SignupAgent::new(
        &page,
        &planner,
        &captcha,
        credentials(),
        StopSignal::new(),
        fast_config(false),
    );

    let outcome = agent.run_url("https://acme.test/").await.expect("run");
    assert_eq!(outcome.status, OutcomeStatus::Skipped);
    assert_eq!(outcome.primary_category, Some(ErrorCategory::AppStore));
    assert_eq!(page.clicked(), vec!["a.cta"]);
}

// Direct app-store URLs never reach navigation or the planner.
#[tokio::test(start_paused = true)]
async fn app_store_url_skipped_before_navigation() {
    let page = FakePage::new("about:blank");
    let planner = ScriptedPlanner::untouchable();
    let captcha = CaptchaHandler::without_solver();
    let agent = SignupAgent::new(
        &page,
        &planner,
        &captcha,
        credentials(),
        StopSignal::new(),
        fast_config(true),
    );

    let outcome = agent
        .run_url("https://apps.apple.com/us/app/acme/id1")
        .await
        .expect("run");
    assert_eq!(outcome.status, OutcomeStatus::Skipped);
    assert_eq!(outcome.primary_category, Some(ErrorCategory::AppStore));
}

// Batch mode: the plan executes sequentially and the oracle confirms from
// the post-submit page.
#[tokio::test(start_paused = true)]
async fn batch_plan_executes_to_success() {
    let page = FakePage::new("about:blank");
    page.set_content(
        "<form><input type=\"email\" id=\"email\"><button type=\"submit\" id=\"go\">Subscribe</button></form>",
    );
    page.add_element("#email");
    page.add_element("#go");
    page.on_click(
        "#go",
        ClickEffect {
            new_url: Some("https://acme.test/thanks".to_string()),
            network_success: true,
        },
    );

    let mut observation = newsletter_observation("https://acme.test/", "Sign up");
    observation["simplifiedHtml"] = json!(
        "<form><input type=\"email\" id=\"email\"><button type=\"submit\" id=\"go\">Subscribe</button></form>"
    );
    page.push_observation(observation.clone());
    page.push_observation(observation.clone());
    page.push_observation(observation);
    page.push_observation(newsletter_observation(
        "https://acme.test/thanks",
        "Thanks for subscribing",
    ));

    let planner = ScriptedPlanner::batched(BatchPlan {
        actions: vec![
            decision(json!({"action": "fill_field", "selector": "#email", "field_type": "email"})),
            decision(json!({
                "action": "click", "selector": "#go",
                "reasoning": "submit the subscription form"
            })),
        ],
        reasoning: "fill and submit".to_string(),
        no_form: false,
    });
    let captcha = CaptchaHandler::without_solver();
    let agent = SignupAgent::new(
        &page,
        &planner,
        &captcha,
        credentials(),
        StopSignal::new(),
        fast_config(true),
    );

    let outcome = agent.run_url("https://acme.test/").await.expect("run");
    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.fields_filled, vec!["#email"]);
    assert!(outcome.form_submitted);
}

// A stop observed mid-loop leaves the URL pending (P5 upstream).
#[tokio::test(start_paused = true)]
async fn stop_interrupts_before_planning() {
    let page = FakePage::new("about:blank");
    page.push_observation(newsletter_observation("https://acme.test/", "Sign up"));

    let planner = ScriptedPlanner::untouchable();
    let captcha = CaptchaHandler::without_solver();
    let stop = StopSignal::new();
    stop.request_stop();
    let agent = SignupAgent::new(
        &page,
        &planner,
        &captcha,
        credentials(),
        stop,
        fast_config(true),
    );

    let outcome = agent.run_url("https://acme.test/").await.expect("run");
    assert!(outcome.interrupted_by_stop);
}
