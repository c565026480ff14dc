// crates/swodlr-common/tests/utilities.rs
// ============================================================================
// Module: Service Utilities Tests
// Description: Parameter parsing, logging settings, retry policy, versions.
// Purpose: Validate per-service helpers over in-memory parameters.
// Dependencies: swodlr-common, tracing
// ============================================================================

//! ## Overview
//! Every test builds [`Utilities`] over static parameters, so no SSM or SDS
//! access happens unless a test starts its own fake server.

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

use std::time::Duration;

use swodlr_common::LatestJobVersion;
use swodlr_common::RetryPolicy;
use swodlr_common::SchemaError;
use swodlr_common::SdsError;
use swodlr_common::Utilities;
use swodlr_common::UtilitiesError;
use tracing::Level;

use crate::common::prod_config;
use crate::common::utilities_for;
use crate::common::utilities_with;

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// Tests plain and parsed parameter lookups.
#[test]
fn params_are_read_and_parsed() {
    let utilities = utilities_with(&[("max_attempts", " 7 "), ("name", "raster")]);
    assert_eq!(utilities.param("name").as_deref(), Some("raster"));
    assert_eq!(utilities.param("missing"), None);
    assert_eq!(utilities.param_parsed::<u32>("max_attempts").unwrap(), Some(7));
    assert_eq!(utilities.param_parsed::<u32>("missing").unwrap(), None);
}

/// Tests that malformed values name the offending parameter.
#[test]
fn malformed_params_are_reported() {
    let utilities = utilities_with(&[("max_attempts", "many")]);
    let err = utilities.param_parsed::<u32>("max_attempts").unwrap_err();
    let UtilitiesError::InvalidParameter {
        name, ..
    } = err
    else {
        panic!("expected invalid parameter error");
    };
    assert_eq!(name, "max_attempts");
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Tests log level resolution, including legacy names.
#[test]
fn log_level_defaults_to_info() {
    assert_eq!(utilities_with(&[]).log_level().unwrap(), Level::INFO);
    assert_eq!(utilities_with(&[("log_level", "debug")]).log_level().unwrap(), Level::DEBUG);
    assert_eq!(utilities_with(&[("log_level", "WARNING")]).log_level().unwrap(), Level::WARN);
    assert_eq!(utilities_with(&[("log_level", "CRITICAL")]).log_level().unwrap(), Level::ERROR);
    assert!(matches!(
        utilities_with(&[("log_level", "LOUD")]).log_level(),
        Err(UtilitiesError::Logging(_))
    ));
}

/// Tests that JSON output is chosen in production or on request.
#[test]
fn logging_config_selects_format() {
    assert!(!utilities_with(&[]).logging_config().unwrap().json_format);
    assert!(utilities_with(&[("log_format", "JSON")]).logging_config().unwrap().json_format);
    assert!(utilities_for(prod_config(), &[]).logging_config().unwrap().json_format);
}

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Tests retry defaults.
#[test]
fn retry_policy_defaults() {
    let policy = utilities_with(&[]).retry_policy().unwrap();
    assert_eq!(policy, RetryPolicy::default());
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.total_attempts(), 4);
    assert_eq!(policy.delay_before(0), Duration::ZERO);
    assert_eq!(policy.delay_before(2), Duration::from_secs(4));
}

/// Tests `max_tries` as a fallback and `backoff_factor` scaling.
#[test]
fn retry_policy_reads_aliases_and_factor() {
    let policy =
        utilities_with(&[("max_tries", "1"), ("backoff_factor", "0.5")]).retry_policy().unwrap();
    assert_eq!(policy.max_attempts, 1);
    assert_eq!(policy.delay_before(3), Duration::from_millis(4_500));

    let preferred =
        utilities_with(&[("max_tries", "1"), ("max_attempts", "5")]).retry_policy().unwrap();
    assert_eq!(preferred.max_attempts, 5);
}

/// Tests that negative backoff factors are rejected.
#[test]
fn retry_policy_rejects_negative_factor() {
    let result = utilities_with(&[("backoff_factor", "-1")]).retry_policy();
    assert!(matches!(result, Err(UtilitiesError::InvalidParameter { .. })));
}

// ============================================================================
// SECTION: Schemas
// ============================================================================

/// Tests schema loading through the utilities handle.
#[test]
fn schemas_load_by_name() {
    let utilities = utilities_with(&[]);
    assert!(utilities.load_json_schema("swodlr-job").is_ok());
    assert!(utilities.jobset_validator().is_ok());
    assert!(matches!(
        utilities.load_json_schema("unknown"),
        Err(UtilitiesError::Schema(SchemaError::NotFound(_)))
    ));
}

// ============================================================================
// SECTION: Job Versions
// ============================================================================

/// Tests that a pinned release tag wins without contacting the SDS.
#[test]
fn release_tag_short_circuits_lookup() {
    let utilities = utilities_with(&[("sds_pcm_release_tag", "2.1.0-hotfix")]);
    let version = utilities.latest_job_version("job-raster").unwrap();
    assert_eq!(version, LatestJobVersion::ReleaseTag("2.1.0-hotfix".to_string()));
    assert_eq!(version.version_label(), "2.1.0-hotfix");
}

/// Tests that missing SDS settings are reported.
#[test]
fn missing_sds_settings_are_reported() {
    let utilities = utilities_with(&[("sds_host", "https://sds.example")]);
    assert!(matches!(utilities.sds_client(), Err(UtilitiesError::Sds(SdsError::Config(_)))));
}

/// Tests that the SDS client is built once and reused.
#[test]
fn sds_client_is_cached() {
    let utilities = utilities_with(&[
        ("sds_host", "https://sds.example/base"),
        ("sds_username", "user"),
        ("sds_password", "secret"),
    ]);
    let first = utilities.sds_client().unwrap();
    let second = utilities.sds_client().unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(first.mozart_es_url().as_str(), "https://sds.example/base/mozart_es/");
}

// ============================================================================
// SECTION: Construction
// ============================================================================

/// Tests that invalid configs are rejected at construction.
#[test]
fn invalid_config_is_rejected() {
    let config = swodlr_common::ServiceConfig::with_environment(
        "swodlr",
        "",
        swodlr_common::Environment::Prod,
    );
    let source = Box::new(swodlr_common::StaticParameters::new());
    assert!(matches!(Utilities::with_source(config, source), Err(UtilitiesError::Config(_))));
}
