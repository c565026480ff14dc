// crates/swodlr-common/tests/jobset_schema.rs
// ============================================================================
// Module: Jobset Schema Tests
// Description: Embedded schema loading and jobset validation.
// Purpose: Ensure malformed jobsets are rejected and unknown fields survive.
// Dependencies: swodlr-common, serde_json
// ============================================================================

//! ## Overview
//! Validates the embedded job and jobset schemas and the typed job model
//! they decode into.
//!
//! Security posture: jobsets arrive from other services and queues; invalid
//! documents must never reach a handler.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use serde_json::json;
use swodlr_common::Job;
use swodlr_common::JobStatus;
use swodlr_common::Jobset;
use swodlr_common::JobsetValidator;
use swodlr_common::SchemaCatalog;
use swodlr_common::SchemaError;
use swodlr_common::job::PIPELINE_FAILED_ERROR;

use crate::common::jobset_value;

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Tests that both embedded schemas are registered.
#[test]
fn catalog_lists_embedded_schemas() {
    let catalog = SchemaCatalog::load().unwrap();
    let names: Vec<&str> = catalog.names().collect();
    assert_eq!(names, vec!["job", "jobset"]);
}

/// Tests that the `swodlr-` prefix is optional when loading by name.
#[test]
fn catalog_accepts_prefixed_names() {
    let catalog = SchemaCatalog::load().unwrap();
    let plain = catalog.schema("job").unwrap();
    let prefixed = catalog.schema("swodlr-job").unwrap();
    assert_eq!(plain, prefixed);
    assert!(catalog.compile("swodlr-jobset").is_ok());
}

/// Tests that unknown schema names are reported.
#[test]
fn catalog_rejects_unknown_names() {
    let catalog = SchemaCatalog::load().unwrap();
    assert!(matches!(catalog.compile("granule"), Err(SchemaError::NotFound(_))));
}

/// Tests that the standalone job schema validates single jobs.
#[test]
fn job_schema_validates_single_jobs() {
    let validator = SchemaCatalog::load().unwrap().compile("job").unwrap();
    assert!(validator.is_valid(&json!({"product_id": "p-1", "job_status": "job-queued"})));
    assert!(!validator.is_valid(&json!({"job_id": "j-1"})));
}

// ============================================================================
// SECTION: Jobset Validation
// ============================================================================

/// Tests that a minimal jobset decodes.
#[test]
fn validator_accepts_minimal_jobset() {
    let validator = JobsetValidator::new().unwrap();
    let jobset = validator.validate(&jobset_value(&["p-1", "p-2"])).unwrap();
    assert_eq!(jobset.len(), 2);
    assert_eq!(jobset.jobs[0].product_id, "p-1");
    assert_eq!(jobset.jobs[1].product_id, "p-2");
}

/// Tests that an empty jobset is valid.
#[test]
fn validator_accepts_empty_jobset() {
    let validator = JobsetValidator::new().unwrap();
    assert!(validator.validate(&json!({"jobs": []})).unwrap().is_empty());
}

/// Tests that documents without `jobs` are rejected.
#[test]
fn validator_rejects_missing_jobs() {
    let validator = JobsetValidator::new().unwrap();
    let err = validator.validate(&json!({"job": []})).unwrap_err();
    assert!(matches!(err, SchemaError::Invalid(_)));
}

/// Tests that jobs missing a product id are rejected through the `$ref`.
#[test]
fn validator_rejects_job_without_product_id() {
    let validator = JobsetValidator::new().unwrap();
    let err = validator.validate(&json!({"jobs": [{"job_id": "j-1"}]})).unwrap_err();
    assert!(matches!(err, SchemaError::Invalid(_)));
}

/// Tests that mistyped fields and malformed statuses are rejected.
#[test]
fn validator_rejects_mistyped_fields() {
    let validator = JobsetValidator::new().unwrap();
    assert!(validator.validate(&json!({"jobs": [{"product_id": 7}]})).is_err());
    assert!(validator.validate(&json!({"jobs": [{"product_id": ""}]})).is_err());
    assert!(
        validator.validate(&json!({"jobs": [{"product_id": "p", "job_status": "done"}]})).is_err()
    );
    assert!(validator.validate(&json!({"jobs": [{"product_id": "p", "errors": [1]}]})).is_err());
}

// ============================================================================
// SECTION: Job Model
// ============================================================================

/// Tests that fields owned by other services survive a decode/encode pass.
#[test]
fn unknown_fields_are_preserved() {
    let validator = JobsetValidator::new().unwrap();
    let input = json!({
        "jobs": [{
            "product_id": "p-1",
            "job_id": "j-1",
            "job_status": "job-started",
            "granule": {"cycle": 7, "pass": 12}
        }],
        "batch": "b-1"
    });
    let jobset = validator.validate(&input).unwrap();
    assert_eq!(jobset.jobs[0].job_status, Some(JobStatus::Started));
    assert_eq!(jobset.jobs[0].extra["granule"], json!({"cycle": 7, "pass": 12}));
    let output = validator.validate_jobset(&jobset).unwrap();
    assert_eq!(output, input);
}

/// Tests that unrecognized statuses are kept verbatim.
#[test]
fn unknown_status_round_trips() {
    let job: Job =
        serde_json::from_value(json!({"product_id": "p", "job_status": "job-paused"})).unwrap();
    assert_eq!(job.job_status, Some(JobStatus::Other("job-paused".to_string())));
    assert!(!job.job_status.as_ref().unwrap().is_terminal());
    assert_eq!(serde_json::to_value(&job).unwrap()["job_status"], "job-paused");
}

/// Tests that failing a job appends to existing errors.
#[test]
fn mark_failed_keeps_existing_errors() {
    let mut job = Job::new("p-1");
    job.errors = Some(vec!["granule missing".to_string()]);
    job.mark_failed("boom");
    assert!(job.is_failed());
    assert_eq!(job.traceback.as_deref(), Some("boom"));
    assert_eq!(job.errors(), ["granule missing".to_string(), PIPELINE_FAILED_ERROR.to_string()]);
}

/// Tests that a failed job still satisfies the schema.
#[test]
fn failed_job_is_schema_valid() {
    let validator = JobsetValidator::new().unwrap();
    let mut job = Job::new("p-1");
    job.mark_failed("boom");
    let value = validator.validate_jobset(&Jobset::new(vec![job])).unwrap();
    assert_eq!(value["jobs"][0]["job_status"], "job-failed");
    assert_eq!(value["jobs"][0]["errors"], json!([PIPELINE_FAILED_ERROR]));
}

/// Tests that an explicitly empty error list survives a round trip.
#[test]
fn empty_errors_list_is_preserved() {
    let input = json!({"product_id": "p-1", "errors": []});
    let job: Job = serde_json::from_value(input.clone()).unwrap();
    assert_eq!(job.errors, Some(Vec::new()));
    assert!(job.errors().is_empty());
    assert_eq!(serde_json::to_value(&job).unwrap(), input);

    let bare: Job = serde_json::from_value(json!({"product_id": "p-2"})).unwrap();
    assert_eq!(bare.errors, None);
    assert!(serde_json::to_value(&bare).unwrap().get("errors").is_none());
}
