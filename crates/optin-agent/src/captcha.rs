//! CAPTCHA handling.
//!
//! Entered only for confirmed-visible challenges. With a solver key
//! configured the challenge goes to the remote service (at most twice per
//! URL); without one, reCAPTCHA v2 gets a single manual checkbox click.
//! Image challenges are not handled.

use crate::error::{AgentError, Result};
use crate::state::{AgentState, MAX_CAPTCHA_SOLVE_ATTEMPTS};
use async_trait::async_trait;
use optin_browser::{scripts, PageDriver};
use optin_core::{CaptchaInfo, CaptchaKind};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;

/// Polling cadence against the solver's result endpoint.
const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Polling iterations (24 × 5 s = 120 s).
const POLL_ITERATIONS: u32 = 24;

/// Pluggable CAPTCHA solving service.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Submit a challenge and poll for the token. `None` means the service
    /// could not solve it.
    async fn solve(
        &self,
        kind: CaptchaKind,
        sitekey: &str,
        page_url: &str,
    ) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct SolverResponse {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    request: String,
}

/// Remote solver speaking the in.php / res.php protocol.
pub struct RemoteSolver {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl RemoteSolver {
    /// Solver bound to an API key.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::Solver(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: "http://2captcha.com".to_string(),
        })
    }

    /// Override the endpoint base (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json(&self, url: &str, params: &[(&str, &str)]) -> Result<SolverResponse> {
        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| AgentError::Solver(e.to_string()))?;
        response
            .json::<SolverResponse>()
            .await
            .map_err(|e| AgentError::Solver(format!("bad solver response: {e}")))
    }
}

#[async_trait]
impl CaptchaSolver for RemoteSolver {
    async fn solve(
        &self,
        kind: CaptchaKind,
        sitekey: &str,
        page_url: &str,
    ) -> Result<Option<String>> {
        let in_url = format!("{}/in.php", self.base_url);
        let submit = match kind {
            CaptchaKind::RecaptchaV2 | CaptchaKind::RecaptchaChallenge => {
                self.get_json(
                    &in_url,
                    &[
                        ("key", self.api_key.as_str()),
                        ("method", "userrecaptcha"),
                        ("googlekey", sitekey),
                        ("pageurl", page_url),
                        ("json", "1"),
                    ],
                )
                .await?
            }
            CaptchaKind::Hcaptcha => {
                self.get_json(
                    &in_url,
                    &[
                        ("key", self.api_key.as_str()),
                        ("method", "hcaptcha"),
                        ("sitekey", sitekey),
                        ("pageurl", page_url),
                        ("json", "1"),
                    ],
                )
                .await?
            }
            _ => {
                tracing::debug!("Solver does not handle {kind:?}");
                return Ok(None);
            }
        };

        if submit.status != 1 {
            tracing::warn!("Solver submit rejected: {}", submit.request);
            return Ok(None);
        }
        let challenge_id = submit.request;
        tracing::debug!("Challenge submitted (id {challenge_id}), polling");

        let res_url = format!("{}/res.php", self.base_url);
        for _ in 0..POLL_ITERATIONS {
            sleep(POLL_INTERVAL).await;
            let poll = self
                .get_json(
                    &res_url,
                    &[
                        ("key", self.api_key.as_str()),
                        ("action", "get"),
                        ("id", challenge_id.as_str()),
                        ("json", "1"),
                    ],
                )
                .await?;
            if poll.status == 1 {
                return Ok(Some(poll.request));
            }
            if poll.request != "CAPCHA_NOT_READY" {
                tracing::warn!("Solver error: {}", poll.request);
                return Ok(None);
            }
        }
        tracing::warn!("Solver timed out after 120s");
        Ok(None)
    }
}

/// Result of one CAPTCHA handling attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaOutcome {
    /// No visible challenge to handle
    NotVisible,
    /// Token injected or checkbox verified
    Solved,
    /// Could not solve; the URL proceeds without it
    Skipped,
}

/// Per-URL CAPTCHA handler.
pub struct CaptchaHandler {
    solver: Option<Box<dyn CaptchaSolver>>,
}

impl CaptchaHandler {
    /// Handler with an optional remote solver.
    #[must_use]
    pub fn new(solver: Option<Box<dyn CaptchaSolver>>) -> Self {
        Self { solver }
    }

    /// Handler with no solver configured (manual checkbox only).
    #[must_use]
    pub fn without_solver() -> Self {
        Self { solver: None }
    }

    /// Attempt the visible challenge once: remote solve + token injection,
    /// then the manual checkbox click for reCAPTCHA v2.
    pub async fn handle(
        &self,
        driver: &dyn PageDriver,
        state: &mut AgentState,
        captcha: &CaptchaInfo,
    ) -> Result<CaptchaOutcome> {
        if !captcha.present || !captcha.visible {
            tracing::debug!("CAPTCHA exists but is not visible, skipping solve attempt");
            return Ok(CaptchaOutcome::NotVisible);
        }

        tracing::info!("Visible CAPTCHA detected: {:?}", captcha.kind);

        if let (Some(solver), Some(sitekey)) = (&self.solver, &captcha.sitekey) {
            if state.captcha_solve_attempts < MAX_CAPTCHA_SOLVE_ATTEMPTS {
                state.captcha_solve_attempts += 1;
                tracing::info!(
                    "Submitting challenge to solver (attempt {}/{})",
                    state.captcha_solve_attempts,
                    MAX_CAPTCHA_SOLVE_ATTEMPTS
                );
                let page_url = driver.current_url().await.unwrap_or_default();
                if let Some(token) = solver.solve(captcha.kind, sitekey, &page_url).await? {
                    if self.inject_token(driver, captcha.kind, &token).await {
                        state.captcha_solved = true;
                        tracing::info!("CAPTCHA solved via remote service");
                        return Ok(CaptchaOutcome::Solved);
                    }
                }
                tracing::warn!("Remote solve failed");
            } else {
                tracing::debug!("Solver attempt budget exhausted for this URL");
            }
        } else if self.solver.is_none() {
            tracing::debug!("No solver configured");
        }

        // Manual fallback: one checkbox click for reCAPTCHA v2
        if captcha.kind == CaptchaKind::RecaptchaV2 && !state.captcha_solved {
            if self.click_recaptcha_checkbox(driver).await {
                state.captcha_solved = true;
                return Ok(CaptchaOutcome::Solved);
            }
        }

        Ok(CaptchaOutcome::Skipped)
    }

    async fn inject_token(&self, driver: &dyn PageDriver, kind: CaptchaKind, token: &str) -> bool {
        let script = match kind {
            CaptchaKind::RecaptchaV2 | CaptchaKind::RecaptchaChallenge => {
                scripts::INJECT_RECAPTCHA_TOKEN
            }
            CaptchaKind::Hcaptcha => scripts::INJECT_HCAPTCHA_TOKEN,
            _ => return false,
        };
        let script = script.replace("__TOKEN__", &scripts::js_string(token));
        match driver.eval_json(&script).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(e) => {
                tracing::debug!("Token injection failed: {e}");
                false
            }
        }
    }

    // Click the anchor checkbox and verify a response token appears within
    // three seconds. Image challenges are out of scope.
    async fn click_recaptcha_checkbox(&self, driver: &dyn PageDriver) -> bool {
        tracing::debug!("Trying manual reCAPTCHA checkbox click");
        let rect = match driver.eval_json(scripts::RECAPTCHA_ANCHOR_RECT).await {
            Ok(value) if value.is_object() => value,
            _ => return false,
        };
        let (Some(x), Some(y), Some(height)) = (
            rect.get("x").and_then(serde_json::Value::as_f64),
            rect.get("y").and_then(serde_json::Value::as_f64),
            rect.get("height").and_then(serde_json::Value::as_f64),
        ) else {
            return false;
        };

        // The checkbox sits at the left edge of the anchor frame
        if driver.click_at(x + 27.0, y + height / 2.0).await.is_err() {
            return false;
        }
        sleep(Duration::from_secs(3)).await;

        match driver.eval_json(scripts::RECAPTCHA_SOLVED_CHECK).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_budget() {
        assert_eq!(POLL_ITERATIONS, 24);
        assert_eq!(POLL_INTERVAL, Duration::from_secs(5));
    }

    #[test]
    fn test_solver_response_parsing() {
        let ok: SolverResponse =
            serde_json::from_str(r#"{"status":1,"request":"12345"}"#).expect("parse");
        assert_eq!(ok.status, 1);
        assert_eq!(ok.request, "12345");

        let pending: SolverResponse =
            serde_json::from_str(r#"{"status":0,"request":"CAPCHA_NOT_READY"}"#).expect("parse");
        assert_eq!(pending.status, 0);
        assert_eq!(pending.request, "CAPCHA_NOT_READY");
    }

    #[tokio::test]
    async fn test_invisible_captcha_not_attempted() {
        struct NeverSolver;
        #[async_trait]
        impl CaptchaSolver for NeverSolver {
            async fn solve(
                &self,
                _kind: CaptchaKind,
                _sitekey: &str,
                _page_url: &str,
            ) -> Result<Option<String>> {
                panic!("solver must not be called for invisible captchas");
            }
        }

        let handler = CaptchaHandler::new(Some(Box::new(NeverSolver)));
        let mut state = AgentState::new_for_url();
        let captcha = CaptchaInfo {
            present: true,
            visible: false,
            kind: CaptchaKind::RecaptchaV2,
            sitekey: Some("key".into()),
        };
        let page = optin_browser::testing::FakePage::new("https://acme.test/");

        let outcome = handler
            .handle(&page, &mut state, &captcha)
            .await
            .expect("handle");
        assert_eq!(outcome, CaptchaOutcome::NotVisible);
        assert_eq!(state.captcha_solve_attempts, 0);
        assert!(!state.captcha_solved);
    }

    #[tokio::test]
    async fn test_solver_attempt_budget_per_url() {
        struct FailingSolver;
        #[async_trait]
        impl CaptchaSolver for FailingSolver {
            async fn solve(
                &self,
                _kind: CaptchaKind,
                _sitekey: &str,
                _page_url: &str,
            ) -> Result<Option<String>> {
                Ok(None)
            }
        }

        let handler = CaptchaHandler::new(Some(Box::new(FailingSolver)));
        let mut state = AgentState::new_for_url();
        let captcha = CaptchaInfo {
            present: true,
            visible: true,
            kind: CaptchaKind::Hcaptcha,
            sitekey: Some("key".into()),
        };
        let page = optin_browser::testing::FakePage::new("https://acme.test/");

        for expected in [1, 2, 2] {
            let outcome = handler
                .handle(&page, &mut state, &captcha)
                .await
                .expect("handle");
            assert_eq!(outcome, CaptchaOutcome::Skipped);
            assert_eq!(state.captcha_solve_attempts, expected);
        }
        assert!(!state.captcha_solved);
    }
}
