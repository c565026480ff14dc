// crates/swodlr-common/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared jobs, configs, and utilities for integration tests.
// Purpose: Keep fixtures identical across test files.
// Dependencies: swodlr-common, serde_json
// ============================================================================

//! ## Overview
//! Deterministic fixtures: service configs that never touch SSM, in-memory
//! parameter sources, and jobset documents.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;
use swodlr_common::Environment;
use swodlr_common::ServiceConfig;
use swodlr_common::StaticParameters;
use swodlr_common::Utilities;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Returns a development config for the `swodlr`/`test` service.
#[must_use]
pub fn dev_config() -> ServiceConfig {
    ServiceConfig::with_environment("swodlr", "test", Environment::Named("dev".to_string()))
}

/// Returns a production config for the `swodlr`/`test` service.
#[must_use]
pub fn prod_config() -> ServiceConfig {
    ServiceConfig::with_environment("swodlr", "test", Environment::Prod)
}

/// Builds utilities over the given parameter pairs.
#[must_use]
pub fn utilities_with(params: &[(&str, &str)]) -> Utilities {
    utilities_for(dev_config(), params)
}

/// Builds utilities for a config over the given parameter pairs.
#[must_use]
pub fn utilities_for(config: ServiceConfig, params: &[(&str, &str)]) -> Utilities {
    let source: StaticParameters =
        params.iter().map(|(name, value)| ((*name).to_string(), (*value).to_string())).collect();
    Utilities::with_source(config, Box::new(source)).unwrap()
}

/// Returns a jobset document with one job per product id.
#[must_use]
pub fn jobset_value(product_ids: &[&str]) -> Value {
    let jobs: Vec<Value> = product_ids.iter().map(|id| json!({"product_id": id})).collect();
    json!({ "jobs": jobs })
}

/// Wraps jobset bodies in a queue event.
#[must_use]
pub fn queue_event(bodies: &[String]) -> Value {
    let records: Vec<Value> = bodies
        .iter()
        .enumerate()
        .map(|(index, body)| json!({"messageId": format!("msg-{index}"), "body": body}))
        .collect();
    json!({ "Records": records })
}
