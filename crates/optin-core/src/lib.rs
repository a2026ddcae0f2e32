//! Optin Core - foundation crate for the optin signup agent.
//!
//! This crate provides the shared value types, configuration and credential
//! engine that every other optin crate depends on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - JSON configuration with clamped validators and app-data paths
//! - [`credentials`] - Signup credentials and logical field resolution
//! - [`phone`] - Country-aware phone number synthesis
//! - [`snapshot`] - Normalised page observations (forms, inputs, buttons, CTA scoring)
//! - [`action`] - Executor actions and per-step records
//! - [`outcome`] - Per-URL outcome records and the error taxonomy
//! - [`stop`] - Cooperative stop signal

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod action;
pub mod config;
pub mod credentials;
pub mod error;
pub mod outcome;
pub mod phone;
pub mod snapshot;
pub mod stop;

pub use action::{ActionKind, ActionRecord, FieldType, PlannedAction};
pub use config::{ApiKeys, BotConfig, CredentialsConfig, DataSource, Settings, STOP_SIGNAL_FILE};
pub use credentials::{Credentials, Phone};
pub use error::{ConfigError, ConfigResult, CoreError, Result};
pub use outcome::{ErrorCategory, Outcome, OutcomeStatus};
pub use snapshot::{
    ButtonDescriptor, CaptchaInfo, CaptchaKind, FormDescriptor, InputDescriptor, InputKind,
    LoginIndicators, NavButton, OverlayInfo, PageSignals, PageSnapshot,
};
pub use stop::StopSignal;
