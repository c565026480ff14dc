// crates/swodlr-common/src/handler.rs
// ============================================================================
// Module: Job Handlers
// Description: Handler traits and the retrying per-job runtime.
// Purpose: Turn handler failures into failed jobs instead of failed batches.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! Services implement [`JobHandler`] for per-job work or [`BulkJobHandler`]
//! when they need the whole batch. [`RetryingHandler`] adapts a per-job handler
//! into a bulk one: each job gets a fresh copy per attempt, failed attempts
//! back off quadratically, and a job that exhausts its attempts is emitted as
//! a `job-failed` job carrying the last error. A panicking attempt counts as a
//! failed attempt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::error::Error;
use std::fmt::Write as _;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use crate::job::Job;
use crate::job::Jobset;
use crate::logging::job_span;
use crate::utilities::Utilities;
use crate::utilities::UtilitiesError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Error type returned by handlers.
pub type HandlerError = Box<dyn Error + Send + Sync + 'static>;

/// Output of a bulk handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    /// Output jobs; the runtime wraps them in a jobset.
    Jobs(Vec<Job>),
    /// A complete jobset built by the handler.
    Jobset(Jobset),
}

impl HandlerOutput {
    /// Converts the output into a jobset.
    #[must_use]
    pub fn into_jobset(self) -> Jobset {
        match self {
            Self::Jobs(jobs) => Jobset::new(jobs),
            Self::Jobset(jobset) => jobset,
        }
    }
}

/// Per-job handler.
///
/// Implementations must return a job with the same `product_id` as the input.
pub trait JobHandler: Send + Sync {
    /// Processes one job.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the attempt fails; the runtime retries.
    fn handle_job(&self, job: Job) -> Result<Job, HandlerError>;
}

/// Batch handler.
///
/// Implementations must preserve the `product_id` of every input job.
pub trait BulkJobHandler: Send + Sync {
    /// Processes a batch of jobs.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the batch as a whole fails.
    fn handle_jobs(&self, jobs: Vec<Job>) -> Result<HandlerOutput, HandlerError>;
}

/// Adapts a closure into a [`JobHandler`].
pub struct FnJobHandler<F>(pub F);

impl<F> JobHandler for FnJobHandler<F>
where
    F: Fn(Job) -> Result<Job, HandlerError> + Send + Sync,
{
    fn handle_job(&self, job: Job) -> Result<Job, HandlerError> {
        (self.0)(job)
    }
}

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Retry schedule for per-job handlers.
///
/// # Invariants
/// - A job is attempted at most `max_attempts + 1` times.
/// - Attempt `n` (0-based) is preceded by a `n² × backoff_unit` pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_attempts: u32,
    /// Backoff unit multiplied by the squared attempt index.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy without pauses between attempts.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_unit: Duration::ZERO,
        }
    }

    /// Returns the total number of invocations allowed per job.
    #[must_use]
    pub const fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    /// Returns the pause before the given 0-based attempt.
    #[must_use]
    pub const fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt.saturating_mul(attempt))
    }
}

// ============================================================================
// SECTION: Retrying Handler
// ============================================================================

/// Bulk handler applying a [`RetryPolicy`] to each job independently.
pub struct RetryingHandler<H> {
    /// Wrapped per-job handler.
    handler: H,
    /// Retry schedule.
    policy: RetryPolicy,
}

impl<H: JobHandler> RetryingHandler<H> {
    /// Wraps a handler with an explicit policy.
    #[must_use]
    pub const fn new(handler: H, policy: RetryPolicy) -> Self {
        Self {
            handler,
            policy,
        }
    }

    /// Wraps a handler with the policy configured for the service.
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError`] when retry parameters are malformed.
    pub fn from_utilities(handler: H, utilities: &Utilities) -> Result<Self, UtilitiesError> {
        Ok(Self::new(handler, utilities.retry_policy()?))
    }

    /// Returns the wrapped handler.
    #[must_use]
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns the active policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs one job through the handler, retrying on failure.
    ///
    /// Never fails: exhausting attempts yields a `job-failed` copy of `input`.
    /// Panics raised by the handler are caught and recorded as attempt errors.
    #[must_use]
    pub fn run_job(&self, input: &Job) -> Job {
        let span = job_span(input);
        let _entered = span.enter();
        let mut last_error = String::new();
        for attempt in 0 .. self.policy.total_attempts() {
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                tracing::info!(seconds = delay.as_secs_f64(), "backing off");
                std::thread::sleep(delay);
            }
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| self.handler.handle_job(input.clone())));
            match outcome {
                Ok(Ok(output)) if output.product_id == input.product_id => return output,
                Ok(Ok(output)) => {
                    last_error = format!(
                        "handler returned product_id {} for input product_id {}",
                        output.product_id, input.product_id
                    );
                    tracing::error!(attempt, error = %last_error, "job handler broke product_id");
                }
                Ok(Err(err)) => {
                    last_error = describe_error(err.as_ref());
                    tracing::error!(attempt, error = %last_error, "job handler attempt failed");
                }
                Err(payload) => {
                    last_error = format!("handler panicked: {}", panic_message(payload.as_ref()));
                    tracing::error!(attempt, error = %last_error, "job handler panicked");
                }
            }
        }

        let attempts = self.policy.total_attempts();
        tracing::warn!(attempts, "job handler exhausted attempts");
        let mut failed = input.clone();
        failed.mark_failed(format!("job handler failed after {attempts} attempts\n{last_error}"));
        failed
    }
}

impl<H: JobHandler> BulkJobHandler for RetryingHandler<H> {
    fn handle_jobs(&self, jobs: Vec<Job>) -> Result<HandlerOutput, HandlerError> {
        Ok(HandlerOutput::Jobs(jobs.iter().map(|job| self.run_job(job)).collect()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Renders an error and its source chain, one cause per line.
#[must_use]
pub fn describe_error(err: &(dyn Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(rendered, "\ncaused by: {cause}");
        source = cause.source();
    }
    rendered
}

/// Extracts the message from a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
