//! The run orchestrator.
//!
//! Serializes URLs through the agent with a max-signups budget, a
//! consecutive-failure cooldown, duplicate skipping, graceful stop handling
//! and outcome persistence. URLs are never processed in parallel.

use crate::error::Result;
use crate::source::UrlEntry;
use crate::summary::RunStats;
use async_trait::async_trait;
use optin_core::{ErrorCategory, Outcome, OutcomeStatus, StopSignal};
use optin_db::{processed_urls, scraped_urls, Database};
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Consecutive failures before the cooldown kicks in.
pub const FAILURE_THRESHOLD: u32 = 5;
/// Cooldown after too many consecutive failures.
pub const COOLDOWN: Duration = Duration::from_secs(60);

/// Per-URL processing seam; production wraps the signup agent, tests
/// substitute scripted processors.
#[async_trait]
pub trait UrlProcessor: Send + Sync {
    /// Process one URL to an outcome. Errors abort the run (fatal LLM
    /// failures); everything else is an outcome.
    async fn process(&self, url: &str) -> optin_agent::Result<Outcome>;
}

/// Orchestrator tunables, derived from the bot settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Successful signups before the run stops
    pub max_signups: i64,
    /// Minimum inter-URL delay in seconds
    pub min_delay: u64,
    /// Maximum inter-URL delay in seconds
    pub max_delay: u64,
    /// Cooldown after [`FAILURE_THRESHOLD`] consecutive failures
    pub cooldown: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_signups: 30,
            min_delay: 10,
            max_delay: 30,
            cooldown: COOLDOWN,
        }
    }
}

/// The sequential URL pipeline.
pub struct Pipeline {
    db: Database,
    stop: StopSignal,
    config: PipelineConfig,
}

impl Pipeline {
    /// Assemble a pipeline over the store and stop signal.
    #[must_use]
    pub fn new(db: Database, stop: StopSignal, config: PipelineConfig) -> Self {
        Self { db, stop, config }
    }

    /// Run the URL sequence through the processor, persisting outcomes.
    ///
    /// # Errors
    /// Returns error on fatal agent failures or persistence failures; the
    /// caller still prints the summary from the returned stats on success.
    pub async fn run(&self, urls: &[UrlEntry], processor: &dyn UrlProcessor) -> Result<RunStats> {
        let mut stats = RunStats::default();
        let mut consecutive_failures = 0u32;
        let total = urls.len();

        tracing::info!("Processing {total} URLs");

        for (index, entry) in urls.iter().enumerate() {
            if self.stop.is_stopped() {
                tracing::info!("Stop requested - ending run");
                break;
            }
            if stats.successful_signups >= self.config.max_signups {
                tracing::info!("Reached max signups limit: {}", self.config.max_signups);
                break;
            }
            if consecutive_failures >= FAILURE_THRESHOLD {
                tracing::warn!(
                    "Too many consecutive failures ({consecutive_failures}), cooling down for {:?}",
                    self.config.cooldown
                );
                sleep(self.config.cooldown).await;
                consecutive_failures = 0;
            }

            tracing::info!("[{}/{}] {}", index + 1, total, entry.url);

            if processed_urls::is_url_processed(self.db.pool(), &entry.url).await? {
                tracing::info!("Skipping duplicate (already processed)");
                stats.duplicates_skipped += 1;
                continue;
            }

            stats.total_attempts += 1;
            let outcome = match processor.process(&entry.url).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => {
                    tracing::error!("Fatal error, terminating run: {e}");
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::error!("Processing error: {e}");
                    let mut outcome = Outcome::skipped(
                        ErrorCategory::Exception,
                        format!("Exception: {}", truncate(&e.to_string(), 150)),
                    );
                    outcome.status = OutcomeStatus::Failed;
                    outcome
                }
            };

            if outcome.interrupted_by_stop {
                // The URL stays pending: no row, no attempt counted
                tracing::info!("URL left in pending state for the next run");
                stats.total_attempts -= 1;
                break;
            }

            let quick_skip = self.record_outcome(entry, &outcome, &mut stats).await?;
            match outcome.status {
                OutcomeStatus::Success => consecutive_failures = 0,
                OutcomeStatus::Skipped => consecutive_failures = 0,
                OutcomeStatus::Failed | OutcomeStatus::Error => consecutive_failures += 1,
            }

            // no_form skips move straight to the next URL
            if !quick_skip && index + 1 < total {
                let delay = rand::thread_rng()
                    .gen_range(self.config.min_delay..=self.config.max_delay.max(self.config.min_delay));
                tracing::debug!("Waiting {delay}s before the next URL");
                sleep(Duration::from_secs(delay)).await;
            }
        }

        Ok(stats)
    }

    // Persist one outcome; returns whether the inter-URL delay is skipped.
    async fn record_outcome(
        &self,
        entry: &UrlEntry,
        outcome: &Outcome,
        stats: &mut RunStats,
    ) -> Result<bool> {
        let details = match outcome.status {
            OutcomeStatus::Success => {
                let signup_type = outcome.signup_type();
                tracing::info!(
                    "Success: {signup_type} signup ({} fields)",
                    outcome.fields_filled.len()
                );
                stats.successful_signups += 1;
                Some(format!(
                    "Signup type: {signup_type}, Fields filled: {}",
                    outcome.fields_filled.len()
                ))
            }
            OutcomeStatus::Skipped => {
                let reason = outcome.primary_error.as_deref().unwrap_or("Skipped");
                tracing::info!("Skipped: {reason}");
                stats.note_skip(outcome.primary_category);
                None
            }
            OutcomeStatus::Failed | OutcomeStatus::Error => {
                let reason = outcome.primary_error.as_deref().unwrap_or("Unknown error");
                tracing::warn!("Failed: {}", truncate(reason, 60));
                stats.failed_attempts += 1;
                None
            }
        };

        processed_urls::add_processed_url(
            self.db.pool(),
            &entry.url,
            &entry.source,
            outcome,
            details.as_deref(),
        )
        .await?;

        if entry.source == "database" {
            scraped_urls::mark_url_processed(self.db.pool(), &entry.url).await?;
        }

        Ok(outcome.status == OutcomeStatus::Skipped
            && outcome.primary_category == Some(ErrorCategory::NoForm))
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedProcessor {
        outcomes: Mutex<Vec<Outcome>>,
        calls: AtomicUsize,
    }

    impl ScriptedProcessor {
        fn new(outcomes: Vec<Outcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UrlProcessor for ScriptedProcessor {
        async fn process(&self, _url: &str) -> optin_agent::Result<Outcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().expect("outcomes lock");
            Ok(if outcomes.is_empty() {
                Outcome::skipped(ErrorCategory::NoForm, "exhausted")
            } else {
                outcomes.remove(0)
            })
        }
    }

    fn success() -> Outcome {
        let mut outcome = Outcome::skipped(ErrorCategory::NoForm, "x");
        outcome.status = OutcomeStatus::Success;
        outcome.primary_error = None;
        outcome.primary_category = None;
        outcome.fields_filled = vec!["#email".to_string()];
        outcome.submit_attempts = 1;
        outcome.form_submitted = true;
        outcome
    }

    fn entries(n: usize) -> Vec<UrlEntry> {
        (0..n)
            .map(|i| UrlEntry {
                url: format!("https://site{i}.test/"),
                source: "csv".to_string(),
            })
            .collect()
    }

    fn fast_config(max_signups: i64) -> PipelineConfig {
        PipelineConfig {
            max_signups,
            min_delay: 0,
            max_delay: 0,
            cooldown: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_max_signups_budget() {
        let db = Database::in_memory().await.expect("db");
        let pipeline = Pipeline::new(db.clone(), StopSignal::new(), fast_config(2));
        let processor = ScriptedProcessor::new(vec![success(), success(), success()]);

        let stats = pipeline
            .run(&entries(5), &processor)
            .await
            .expect("run");
        assert_eq!(stats.successful_signups, 2);
        assert_eq!(processor.calls(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_skipped_without_processing() {
        let db = Database::in_memory().await.expect("db");
        processed_urls::add_processed_url(
            db.pool(),
            "https://site0.test/",
            "csv",
            &Outcome::skipped(ErrorCategory::NoForm, "earlier run"),
            None,
        )
        .await
        .expect("seed");

        let pipeline = Pipeline::new(db.clone(), StopSignal::new(), fast_config(10));
        let processor = ScriptedProcessor::new(vec![success()]);
        let stats = pipeline
            .run(&entries(2), &processor)
            .await
            .expect("run");

        assert_eq!(stats.duplicates_skipped, 1);
        assert_eq!(processor.calls(), 1);
        assert_eq!(stats.total_attempts, 1);
    }

    #[tokio::test]
    async fn test_interrupted_url_not_persisted() {
        let db = Database::in_memory().await.expect("db");
        let pipeline = Pipeline::new(db.clone(), StopSignal::new(), fast_config(10));
        let processor = ScriptedProcessor::new(vec![Outcome::interrupted()]);

        let stats = pipeline
            .run(&entries(3), &processor)
            .await
            .expect("run");

        // P5: no row written, no attempt counted, run stopped
        assert_eq!(stats.total_attempts, 0);
        assert_eq!(processor.calls(), 1);
        assert!(!processed_urls::is_url_processed(db.pool(), "https://site0.test/")
            .await
            .expect("check"));
    }

    #[tokio::test]
    async fn test_stop_before_first_url() {
        let db = Database::in_memory().await.expect("db");
        let stop = StopSignal::new();
        stop.request_stop();
        let pipeline = Pipeline::new(db, stop, fast_config(10));
        let processor = ScriptedProcessor::new(vec![success()]);

        let stats = pipeline
            .run(&entries(3), &processor)
            .await
            .expect("run");
        assert_eq!(processor.calls(), 0);
        assert_eq!(stats.total_attempts, 0);
    }

    #[tokio::test]
    async fn test_failures_trigger_cooldown_and_reset() {
        let db = Database::in_memory().await.expect("db");
        let pipeline = Pipeline::new(db, StopSignal::new(), fast_config(10));

        let mut failures = Vec::new();
        for _ in 0..6 {
            let mut outcome = Outcome::skipped(ErrorCategory::NoConfirmation, "no confirmation");
            outcome.status = OutcomeStatus::Failed;
            failures.push(outcome);
        }
        let processor = ScriptedProcessor::new(failures);

        let stats = pipeline
            .run(&entries(6), &processor)
            .await
            .expect("run");
        // All six processed; the cooldown fires after the fifth failure
        assert_eq!(stats.failed_attempts, 6);
        assert_eq!(processor.calls(), 6);
    }

    #[tokio::test]
    async fn test_database_source_marks_queue_row() {
        let db = Database::in_memory().await.expect("db");
        scraped_urls::add_scraped_url(db.pool(), "https://q.test/", None, None)
            .await
            .expect("queue");

        let pipeline = Pipeline::new(db.clone(), StopSignal::new(), fast_config(10));
        let processor = ScriptedProcessor::new(vec![success()]);
        let urls = vec![UrlEntry {
            url: "https://q.test/".to_string(),
            source: "database".to_string(),
        }];
        pipeline.run(&urls, &processor).await.expect("run");

        let pending = scraped_urls::get_unprocessed_urls(db.pool(), 10)
            .await
            .expect("pending");
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_fatal_agent_error_terminates_run() {
        struct FatalProcessor;
        #[async_trait]
        impl UrlProcessor for FatalProcessor {
            async fn process(&self, _url: &str) -> optin_agent::Result<Outcome> {
                Err(optin_agent::AgentError::Llm(
                    optin_llm::LlmError::QuotaExceeded("quota".to_string()),
                ))
            }
        }

        let db = Database::in_memory().await.expect("db");
        let pipeline = Pipeline::new(db, StopSignal::new(), fast_config(10));
        let result = pipeline.run(&entries(3), &FatalProcessor).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_transient_agent_error_becomes_exception_outcome() {
        struct FlakyProcessor;
        #[async_trait]
        impl UrlProcessor for FlakyProcessor {
            async fn process(&self, _url: &str) -> optin_agent::Result<Outcome> {
                Err(optin_agent::AgentError::Solver("socket closed".to_string()))
            }
        }

        let db = Database::in_memory().await.expect("db");
        let pipeline = Pipeline::new(db.clone(), StopSignal::new(), fast_config(10));
        let stats = pipeline
            .run(&entries(1), &FlakyProcessor)
            .await
            .expect("run");
        assert_eq!(stats.failed_attempts, 1);

        let rows = processed_urls::get_processed_urls(db.pool(), 10)
            .await
            .expect("rows");
        assert_eq!(rows[0].error_category.as_deref(), Some("exception"));
    }
}
