// crates/swodlr-common/src/lib.rs
// ============================================================================
// Module: SWODLR Common
// Description: Shared runtime for SWODLR job-processing services.
// Purpose: Provide job models, validation, parameters, and handler runtimes.
// Dependencies: aws-sdk-ssm, jsonschema, reqwest, serde, tracing
// ============================================================================

//! ## Overview
//! This crate is the common library behind every SWODLR processing service.
//! It defines the [`Job`]/[`Jobset`] wire model and its embedded JSON
//! schemas, loads per-service parameters from SSM or the local environment,
//! and wraps service handlers in a runtime that validates input, retries
//! failing jobs, and never lets one bad job fail a batch.
//! Invariants:
//! - Every jobset entering or leaving [`JobsetService`] passes schema validation.
//! - Handlers never change a job's `product_id`; violations fail the job.
//!
//! Security posture: events and SDS responses are untrusted; credentials are
//! read from parameters and never logged.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod handler;
pub mod job;
pub mod logging;
pub mod params;
pub mod schema;
pub mod sds;
pub mod semver;
pub mod service;
pub mod utilities;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::Environment;
pub use config::ServiceConfig;
pub use handler::BulkJobHandler;
pub use handler::FnJobHandler;
pub use handler::HandlerError;
pub use handler::HandlerOutput;
pub use handler::JobHandler;
pub use handler::RetryPolicy;
pub use handler::RetryingHandler;
pub use job::Job;
pub use job::JobStatus;
pub use job::Jobset;
pub use logging::LoggingConfig;
pub use logging::init_logging;
pub use params::ParameterError;
pub use params::ParameterSource;
pub use params::StaticParameters;
pub use schema::JobsetValidator;
pub use schema::SchemaCatalog;
pub use schema::SchemaError;
pub use sds::LatestJobVersion;
pub use sds::SdsClient;
pub use sds::SdsError;
pub use semver::SemVer;
pub use service::JobsetService;
pub use service::ServiceError;
pub use utilities::Utilities;
pub use utilities::UtilitiesError;
