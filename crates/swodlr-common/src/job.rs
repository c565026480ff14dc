// crates/swodlr-common/src/job.rs
// ============================================================================
// Module: Job Models
// Description: Typed job and jobset envelopes exchanged between services.
// Purpose: Give handlers typed access while preserving unknown fields.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Jobset`] is the `{"jobs": [...]}` envelope passed between SWODLR
//! services. Each [`Job`] is identified by its `product_id`; fields this crate
//! does not model are kept in [`Job::extra`] so that a service never drops data
//! owned by another stage of the pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Error message appended to jobs that exhaust their handler attempts.
pub const PIPELINE_FAILED_ERROR: &str = "SDS pipeline failed";

// ============================================================================
// SECTION: Job Status
// ============================================================================

/// SDS job status label.
///
/// # Invariants
/// - Serializes as its label; unknown labels survive as [`JobStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    /// `job-queued`
    Queued,
    /// `job-started`
    Started,
    /// `job-completed`
    Completed,
    /// `job-failed`
    Failed,
    /// `job-offline`
    Offline,
    /// `job-deduped`
    Deduped,
    /// `job-revoked`
    Revoked,
    /// Any other label reported by the SDS.
    Other(String),
}

impl JobStatus {
    /// Returns the wire label for the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "job-queued",
            Self::Started => "job-started",
            Self::Completed => "job-completed",
            Self::Failed => "job-failed",
            Self::Offline => "job-offline",
            Self::Deduped => "job-deduped",
            Self::Revoked => "job-revoked",
            Self::Other(label) => label.as_str(),
        }
    }

    /// Returns true for statuses after which the SDS does no further work.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Offline | Self::Deduped | Self::Revoked)
    }
}

impl From<String> for JobStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "job-queued" => Self::Queued,
            "job-started" => Self::Started,
            "job-completed" => Self::Completed,
            "job-failed" => Self::Failed,
            "job-offline" => Self::Offline,
            "job-deduped" => Self::Deduped,
            "job-revoked" => Self::Revoked,
            _ => Self::Other(value),
        }
    }
}

impl From<JobStatus> for String {
    fn from(value: JobStatus) -> Self {
        match value {
            JobStatus::Other(label) => label,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Job
// ============================================================================

/// A single product-generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Product identifier; stable across every stage of the pipeline.
    pub product_id: String,
    /// SDS job identifier once the job has been submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Last known SDS status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_status: Option<JobStatus>,
    /// Failure detail captured when a handler gives up on the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    /// Accumulated error messages; an explicitly empty list is preserved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    /// Fields owned by other services.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    /// Creates a job with only a product identifier.
    #[must_use]
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            job_id: None,
            job_status: None,
            traceback: None,
            errors: None,
            extra: Map::new(),
        }
    }

    /// Marks the job as failed by the pipeline.
    ///
    /// Existing errors are kept and [`PIPELINE_FAILED_ERROR`] is appended.
    pub fn mark_failed(&mut self, traceback: impl Into<String>) {
        self.job_status = Some(JobStatus::Failed);
        self.traceback = Some(traceback.into());
        self.errors.get_or_insert_with(Vec::new).push(PIPELINE_FAILED_ERROR.to_string());
    }

    /// Returns the accumulated error messages, empty when none were recorded.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        self.errors.as_deref().unwrap_or_default()
    }

    /// Returns true when the job has been marked failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.job_status == Some(JobStatus::Failed)
    }
}

// ============================================================================
// SECTION: Jobset
// ============================================================================

/// The envelope exchanged between services.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Jobset {
    /// Jobs in the set, in input order.
    pub jobs: Vec<Job>,
    /// Envelope-level fields owned by other services.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Jobset {
    /// Creates a jobset from a list of jobs.
    #[must_use]
    pub fn new(jobs: Vec<Job>) -> Self {
        Self {
            jobs,
            extra: Map::new(),
        }
    }

    /// Returns the number of jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true when the set holds no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl From<Vec<Job>> for Jobset {
    fn from(jobs: Vec<Job>) -> Self {
        Self::new(jobs)
    }
}
