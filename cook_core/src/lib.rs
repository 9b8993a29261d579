#![forbid(unsafe_code)]

//! Core domain model and business logic for Cookalong.
//!
//! This crate provides:
//! - Domain types (recipes, voice languages, preferences, preparation logs)
//! - Recipe catalog management
//! - The guided cooking session state machine and its event loop
//! - Persistence (JSONL preparation log, preferences, config)
//! - Admin reporting over preparation logs

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod timer;
pub mod narration;
pub mod services;
pub mod session;
pub mod runner;
pub mod adapters;
pub mod prep_log;
pub mod preferences;
pub mod report;

// Re-export commonly used types
pub use error::{Error, Result, TranslationError};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog, Catalog};
pub use config::Config;
pub use narration::NarrationTicket;
pub use prep_log::{read_logs, JsonlLogStore};
pub use runner::{CookRunner, RunSummary, RunnerEvent, RunnerServices, RunnerSettings};
pub use services::{AlarmBell, PrepLogStore, SessionView, Speaker, Translator};
pub use session::{CookSession, Notice, SessionAction, SessionSnapshot};
pub use timer::{format_clock, StepTimer};
