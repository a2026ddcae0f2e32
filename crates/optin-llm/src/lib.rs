//! Optin LLM - the planner behind the signup agent.
//!
//! # Modules
//!
//! - [`client`] - Chat-completions transport with rate-limit handling
//! - [`cost`] - Per-run API cost accounting
//! - [`prompt`] - Prompt assembly from shared fragments
//! - [`planner`] - Stepwise, batch and verification operations
//! - [`error`] - LLM error types with run-fatality classification

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod cost;
pub mod error;
pub mod planner;
pub mod prompt;

pub use client::{parse_json_content, parse_retry_after, ChatClient, Usage, UserContent};
pub use cost::{CostSummary, CostTracker, ModelUsage, MODEL_PRICING};
pub use error::{LlmError, Result};
pub use planner::{
    batch_preflight, ActiveFormContext, BatchContext, BatchPlan, HistoryEntry, LlmPlanner,
    Planner, PlannerDecision, StepContext, Verdict, VerifyContext, SYSTEM_PROMPT,
};
