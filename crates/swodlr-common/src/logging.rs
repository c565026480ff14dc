// crates/swodlr-common/src/logging.rs
// ============================================================================
// Module: Logging
// Description: Subscriber initialization and job-scoped spans.
// Purpose: Attach job metadata to every event emitted while handling a job.
// Dependencies: tracing, tracing-subscriber
// ============================================================================

//! ## Overview
//! Services initialize a single `tracing` subscriber at startup via
//! [`init_logging`]. While a job is being handled the runtime enters
//! [`job_span`], so every event emitted by the handler carries the job's
//! `product_id` and `job_id` without the handler threading a logger around.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing::Span;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::job::Job;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Logging configuration and initialization errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoggingError {
    /// The configured log level is not recognized.
    #[error("unknown log level: {0}")]
    UnknownLevel(String),
    /// A global subscriber is already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

// ============================================================================
// SECTION: Levels
// ============================================================================

/// Parses a log level name.
///
/// Accepts the level names services have historically configured: `DEBUG`,
/// `INFO`, `WARNING`/`WARN`, `ERROR`, `CRITICAL`, and `TRACE`, in any case.
/// `CRITICAL` maps to [`Level::ERROR`].
///
/// # Errors
///
/// Returns [`LoggingError::UnknownLevel`] for any other name.
pub fn parse_level(raw: &str) -> Result<Level, LoggingError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" | "CRITICAL" => Ok(Level::ERROR),
        _ => Level::from_str(raw.trim()).map_err(|_| LoggingError::UnknownLevel(raw.to_string())),
    }
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Maximum level emitted when `RUST_LOG` is not set.
    pub level: Level,
    /// Emit JSON lines instead of human-readable text.
    pub json_format: bool,
    /// Include the event target (module path).
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Production configuration: JSON lines at INFO.
    #[must_use]
    pub const fn production() -> Self {
        Self {
            level: Level::INFO,
            json_format: true,
            include_target: true,
        }
    }
}

// ============================================================================
// SECTION: Initialization
// ============================================================================

/// Installs the global subscriber.
///
/// `RUST_LOG`, when set, overrides the configured level.
///
/// # Errors
///
/// Returns [`LoggingError::AlreadyInitialized`] when a global subscriber has
/// already been installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_ascii_lowercase()));

    if config.json_format {
        let fmt_layer = fmt::layer().json().with_current_span(true).with_target(config.include_target);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|err| LoggingError::AlreadyInitialized(err.to_string()))
    } else {
        let fmt_layer = fmt::layer().with_target(config.include_target);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|err| LoggingError::AlreadyInitialized(err.to_string()))
    }
}

// ============================================================================
// SECTION: Job Metadata
// ============================================================================

/// Creates the span entered while a job is handled.
///
/// `job_id` is left unrecorded for jobs not yet submitted to the SDS.
#[must_use]
pub fn job_span(job: &Job) -> Span {
    let span = tracing::info_span!(
        "job",
        product_id = %job.product_id,
        job_id = tracing::field::Empty,
    );
    if let Some(job_id) = job.job_id.as_deref() {
        span.record("job_id", job_id);
    }
    span
}

/// Renders `[product_id: X, job_id: Y]` for plain-text contexts.
///
/// A missing job id renders as `None`.
#[must_use]
pub fn job_label(job: &Job) -> String {
    format!(
        "[product_id: {}, job_id: {}]",
        job.product_id,
        job.job_id.as_deref().unwrap_or("None")
    )
}
