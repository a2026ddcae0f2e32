//! Optin Agent - the per-URL signup state machine.
//!
//! # Modules
//!
//! - [`agent`] - The reasoning loop composing every other component
//! - [`classifier`] - Snapshot → page class (signup / login / blog / …)
//! - [`executor`] - Action execution with fallback strategies
//! - [`guard`] - Stuck-loop and hallucination detection
//! - [`oracle`] - Calibrated multi-signal success decisions
//! - [`overlay`] - Overlay classification and dismissal
//! - [`captcha`] - Remote solver plus manual checkbox fallback
//! - [`selector`] - Planner selector shapes and existence checks
//! - [`state`] - Per-URL mutable state and its budgets
//! - [`report`] - Failure distillation into the error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod agent;
pub mod captcha;
pub mod classifier;
pub mod error;
pub mod executor;
pub mod guard;
pub mod oracle;
pub mod overlay;
pub mod report;
pub mod selector;
pub mod state;

pub use agent::{should_use_vision, AgentConfig, SignupAgent};
pub use captcha::{CaptchaHandler, CaptchaOutcome, CaptchaSolver, RemoteSolver};
pub use classifier::{
    classify, is_app_store_title, is_app_store_url, Classification, NavigationContext, PageClass,
    APP_STORE_DOMAINS,
};
pub use error::{AgentError, Result};
pub use executor::{classify_click, humanize_error, phone_value_matches, ClickClass, Executor};
pub use guard::{check_selector, detect_stuck, validate_plan, SelectorCheck, StuckReason};
pub use oracle::{audit_success, detect_success, rescue_success, SuccessCheck};
pub use overlay::{classify_overlay, OverlayOutcome};
pub use report::{build_failure_report, FailureReport};
pub use state::{AgentState, MAX_STEPS};
