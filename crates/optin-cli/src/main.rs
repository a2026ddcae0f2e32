//! Command-line entry point.
//!
//! Loads the JSON configuration, applies CLI overrides, assembles the
//! browser, planner and pipeline, and runs the URL sequence. Exit code 0 on
//! a clean finish, 1 on configuration or fatal errors.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use optin_agent::{AgentConfig, CaptchaHandler, RemoteSolver, SignupAgent};
use optin_browser::{BrowserEngine, CdpPage};
use optin_core::{BotConfig, CredentialsConfig, DataSource, Outcome, StopSignal};
use optin_db::{api_sessions, Database, SessionUsage};
use optin_llm::{ChatClient, CostTracker, LlmPlanner};
use optin_pipeline::{load_urls, print_summary, Pipeline, PipelineConfig, UrlProcessor};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    Csv,
    Meta,
    Database,
}

impl From<SourceArg> for DataSource {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::Csv => Self::Csv,
            SourceArg::Meta => Self::Meta,
            SourceArg::Database => Self::Database,
        }
    }
}

/// Autonomous newsletter signup agent.
#[derive(Debug, Parser)]
#[command(name = "optin", version, about)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Inline credentials JSON (overrides the config file)
    #[arg(long)]
    credentials: Option<String>,

    /// URL source
    #[arg(long, value_enum)]
    source: Option<SourceArg>,

    /// Successful signups before the run stops
    #[arg(long)]
    max_signups: Option<i64>,

    /// Run the browser headless
    #[arg(long)]
    headless: bool,

    /// Verbose debug logging
    #[arg(long)]
    debug: bool,
}

// The pipeline's per-URL seam, wrapping a fresh agent around the shared
// page, planner and CAPTCHA handler.
struct AgentProcessor {
    page: CdpPage,
    planner: LlmPlanner,
    captcha: CaptchaHandler,
    credentials: optin_core::Credentials,
    stop: StopSignal,
    agent_config: AgentConfig,
}

#[async_trait]
impl UrlProcessor for AgentProcessor {
    async fn process(&self, url: &str) -> optin_agent::Result<Outcome> {
        let agent = SignupAgent::new(
            &self.page,
            &self.planner,
            &self.captcha,
            self.credentials.clone(),
            self.stop.clone(),
            self.agent_config.clone(),
        );
        agent.run_url(url).await
    }
}

fn load_config(cli: &Cli) -> Result<BotConfig> {
    let mut config = match &cli.config {
        Some(path) => BotConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => BotConfig::default(),
    };

    if let Some(json) = &cli.credentials {
        let credentials: CredentialsConfig =
            serde_json::from_str(json).context("invalid --credentials JSON")?;
        config.credentials = credentials;
    }
    if let Some(source) = cli.source {
        config.settings.data_source = source.into();
    }
    if let Some(max_signups) = cli.max_signups {
        config.settings.max_signups = max_signups;
    }
    if cli.headless {
        config.settings.headless = true;
    }
    if cli.debug {
        config.settings.debug = true;
    }
    config.settings.clamp_ranges();
    Ok(config)
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    init_tracing(config.settings.debug);
    tracing::info!("Starting optin agent");

    let stop = StopSignal::with_stop_file(
        BotConfig::stop_signal_path().context("cannot resolve the app data directory")?,
    );
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received - stopping gracefully");
                stop.request_stop();
            }
        });
    }

    let db_path = BotConfig::default_db_path().context("cannot resolve the database path")?;
    let db = Database::connect(&db_path)
        .await
        .context("failed to open the database")?;

    let urls = load_urls(
        config.settings.data_source,
        &config.settings.csv_path,
        &db,
        config.settings.max_signups,
    )
    .await
    .context("failed to load URLs")?;
    if urls.is_empty() {
        tracing::warn!("No URLs to process");
        return Ok(());
    }

    let engine = BrowserEngine::launch(config.settings.headless)
        .await
        .context("failed to launch the browser")?;
    let page = engine.new_page().await.context("failed to open a page")?;

    let cost = Arc::new(Mutex::new(CostTracker::new()));
    let client = ChatClient::new(&config.api_keys.openai, &config.settings.llm_model)
        .context("LLM client configuration")?;
    let planner = LlmPlanner::new(client, Arc::clone(&cost));

    let captcha = match config.api_keys.captcha_key() {
        Some(key) => CaptchaHandler::new(Some(Box::new(
            RemoteSolver::new(key).context("captcha solver configuration")?,
        ))),
        None => CaptchaHandler::without_solver(),
    };

    let processor = AgentProcessor {
        page,
        planner,
        captcha,
        credentials: config.credentials.to_credentials(),
        stop: stop.clone(),
        agent_config: AgentConfig {
            batch_planning: config.settings.batch_planning,
            ..AgentConfig::default()
        },
    };

    let pipeline = Pipeline::new(
        db.clone(),
        stop,
        PipelineConfig {
            max_signups: config.settings.max_signups,
            min_delay: u64::try_from(config.settings.min_delay).unwrap_or(10),
            max_delay: u64::try_from(config.settings.max_delay).unwrap_or(30),
            ..PipelineConfig::default()
        },
    );

    let started = Instant::now();
    let run_result = pipeline.run(&urls, &processor).await;

    // The cost session and summary are written even when the run aborted
    let summary = cost.lock().map(|c| c.snapshot()).unwrap_or_default();
    let entries: Vec<SessionUsage> = summary
        .by_model
        .iter()
        .map(|(model, usage)| SessionUsage {
            model: model.clone(),
            input_tokens: i64::try_from(usage.input_tokens).unwrap_or(i64::MAX),
            output_tokens: i64::try_from(usage.output_tokens).unwrap_or(i64::MAX),
            cost: format!("{:.6}", usage.cost),
            api_calls: i64::try_from(usage.calls).unwrap_or(i64::MAX),
        })
        .collect();
    if !entries.is_empty() {
        if let Err(e) = api_sessions::save_session(db.pool(), &entries).await {
            tracing::warn!("Could not persist API session costs: {e}");
        }
    }

    engine.close().await;

    match run_result {
        Ok(stats) => {
            print_summary(&stats, &summary, started.elapsed());
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run terminated: {e}");
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
