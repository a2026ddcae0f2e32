//! Optin Pipeline - run orchestration over the signup agent.
//!
//! # Modules
//!
//! - [`source`] - URL sources (CSV file, scraped queue, auto-switch)
//! - [`orchestrator`] - The sequential run loop with budgets and cooldowns
//! - [`summary`] - Run statistics and the end-of-run summary
//! - [`error`] - Pipeline error types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod error;
pub mod orchestrator;
pub mod source;
pub mod summary;

pub use error::{PipelineError, Result};
pub use orchestrator::{Pipeline, PipelineConfig, UrlProcessor, COOLDOWN, FAILURE_THRESHOLD};
pub use source::{load_csv_urls, load_urls, UrlEntry};
pub use summary::{print_summary, RunStats};
