// crates/swodlr-common/src/service.rs
// ============================================================================
// Module: Jobset Service
// Description: Validated entry points for direct and queue-delivered events.
// Purpose: Keep schema checks and record filtering out of handler code.
// Dependencies: serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`JobsetService`] is the runtime around a [`BulkJobHandler`]. A direct
//! invocation must carry a valid jobset; a queue invocation carries records
//! whose bodies are jobsets, and invalid records are logged and skipped so one
//! bad message cannot sink the batch. Output is validated before it is
//! returned.
//! Security posture: event payloads are untrusted; every jobset is checked
//! against the embedded schema before a handler sees it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::handler::BulkJobHandler;
use crate::handler::describe_error;
use crate::job::Job;
use crate::job::Jobset;
use crate::schema::JobsetValidator;
use crate::utilities::Utilities;
use crate::utilities::UtilitiesError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Service invocation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The event is not a valid jobset or queue event.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The handler produced a jobset that fails validation.
    #[error("invalid output: {0}")]
    InvalidOutput(String),
    /// The bulk handler failed as a whole.
    #[error("handler failed: {0}")]
    Handler(String),
}

// ============================================================================
// SECTION: Queue Events
// ============================================================================

/// Queue event carrying jobset records.
///
/// Records stay raw so each one is decoded, and rejected, on its own.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueEvent {
    /// Delivered records.
    #[serde(rename = "Records")]
    pub records: Vec<Value>,
}

/// Single queue record.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueRecord {
    /// Broker-assigned message identifier.
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
    /// JSON-encoded jobset; the broker always delivers a string.
    #[serde(default)]
    pub body: Option<Value>,
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Validating runtime around a bulk handler.
pub struct JobsetService<B> {
    /// Wrapped handler.
    handler: B,
    /// Input and output validator.
    validator: JobsetValidator,
}

impl<B: BulkJobHandler> JobsetService<B> {
    /// Builds a service from a handler and a compiled validator.
    #[must_use]
    pub const fn new(handler: B, validator: JobsetValidator) -> Self {
        Self {
            handler,
            validator,
        }
    }

    /// Builds a service using the validator from `utilities`.
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError`] when the jobset schema fails to compile.
    pub fn from_utilities(handler: B, utilities: &Utilities) -> Result<Self, UtilitiesError> {
        Ok(Self::new(handler, utilities.jobset_validator()?))
    }

    /// Returns the wrapped handler.
    #[must_use]
    pub const fn handler(&self) -> &B {
        &self.handler
    }

    /// Handles a directly invoked jobset.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidInput`] when `event` is not a valid
    /// jobset, [`ServiceError::Handler`] when the handler fails, and
    /// [`ServiceError::InvalidOutput`] when its output fails validation.
    pub fn invoke(&self, event: &Value) -> Result<Value, ServiceError> {
        let input = self.validator.validate(event).map_err(|err| {
            tracing::error!(error = %err, "error validating input jobset");
            ServiceError::InvalidInput(err.to_string())
        })?;
        self.process(input.jobs)
    }

    /// Handles a queue event, merging the jobs of every valid record.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidInput`] when `event` is not a queue
    /// event; otherwise as [`JobsetService::invoke`].
    pub fn invoke_queue(&self, event: &Value) -> Result<Value, ServiceError> {
        let queue_event = QueueEvent::deserialize(event)
            .map_err(|err| ServiceError::InvalidInput(format!("queue event: {err}")))?;
        tracing::debug!(records = queue_event.records.len(), "queue records received");

        let mut jobs = Vec::new();
        for record in &queue_event.records {
            match self.decode_record(record) {
                Ok(jobset) => jobs.extend(jobset.jobs),
                Err(err) => tracing::error!(
                    message_id = message_id(record),
                    error = %err,
                    "error validating input jobset; skipping record"
                ),
            }
        }
        self.process(jobs)
    }

    /// Parses and validates one record body.
    fn decode_record(&self, record: &Value) -> Result<Jobset, ServiceError> {
        let record = QueueRecord::deserialize(record)
            .map_err(|err| ServiceError::InvalidInput(format!("queue record: {err}")))?;
        let raw = match record.body {
            Some(Value::String(raw)) => raw,
            Some(_) => {
                return Err(ServiceError::InvalidInput("record body is not a string".to_string()));
            }
            None => return Err(ServiceError::InvalidInput("record has no body".to_string())),
        };
        let body: Value = serde_json::from_str(&raw)
            .map_err(|err| ServiceError::InvalidInput(format!("record body: {err}")))?;
        self.validator.validate(&body).map_err(|err| ServiceError::InvalidInput(err.to_string()))
    }

    /// Runs the handler and validates its output.
    fn process(&self, jobs: Vec<Job>) -> Result<Value, ServiceError> {
        tracing::info!(jobs = jobs.len(), "handling jobs");
        let output = self
            .handler
            .handle_jobs(jobs)
            .map_err(|err| ServiceError::Handler(describe_error(err.as_ref())))?;
        self.validator.validate_jobset(&output.into_jobset()).map_err(|err| {
            tracing::error!(error = %err, "error validating output jobset");
            ServiceError::InvalidOutput(err.to_string())
        })
    }
}

/// Returns a record's message identifier for logging.
fn message_id(record: &Value) -> &str {
    record.get("messageId").and_then(Value::as_str).unwrap_or("unknown")
}
