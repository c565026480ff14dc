// crates/swodlr-common/src/params/tests.rs
// ============================================================================
// Module: Parameter Pagination Tests
// Description: Unit tests for SSM pagination and the blocking SDK bridge.
// Purpose: Validate page following, prefix stripping, and loop detection.
// Dependencies: swodlr-common
// ============================================================================

//! ## Overview
//! Exercises [`collect_parameters`] against an in-memory page client so the
//! pagination contract is checked without AWS access, and drives the blocking
//! SDK bridge from each kind of calling context.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    reason = "Test-only assertions favor direct unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use super::*;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const PATH: &str = "/service/swodlr/raster-create/";

/// Page client replaying a fixed sequence of pages.
struct ScriptedPages {
    /// Pages keyed by the token that requests them (`None` for the first).
    pages: Vec<(Option<String>, ParameterPage)>,
    /// Tokens observed, in request order.
    seen: Mutex<Vec<Option<String>>>,
}

impl ScriptedPages {
    fn new(pages: Vec<(Option<&str>, ParameterPage)>) -> Self {
        Self {
            pages: pages.into_iter().map(|(token, page)| (token.map(str::to_string), page)).collect(),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl ParameterPageClient for ScriptedPages {
    fn fetch_page(
        &self,
        path: &str,
        next_token: Option<&str>,
    ) -> Result<ParameterPage, ParameterError> {
        assert_eq!(path, PATH);
        self.seen.lock().unwrap().push(next_token.map(str::to_string));
        self.pages
            .iter()
            .find(|(token, _)| token.as_deref() == next_token)
            .map(|(_, page)| page.clone())
            .ok_or_else(|| ParameterError::Backend("unknown token".to_string()))
    }
}

fn page(parameters: &[(&str, &str)], next_token: Option<&str>) -> ParameterPage {
    ParameterPage {
        parameters: parameters
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect(),
        next_token: next_token.map(str::to_string),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn collects_every_page_in_order() {
    let client = ScriptedPages::new(vec![
        (None, page(&[("/service/swodlr/raster-create/log_level", "DEBUG")], Some("t1"))),
        (Some("t1"), page(&[("/service/swodlr/raster-create/sds_host", "https://sds")], Some("t2"))),
        (Some("t2"), page(&[("/service/swodlr/raster-create/max_attempts", "5")], None)),
    ]);

    let values = collect_parameters(&client, PATH).unwrap();

    assert_eq!(values.len(), 3);
    assert_eq!(values.get("log_level").map(String::as_str), Some("DEBUG"));
    assert_eq!(values.get("sds_host").map(String::as_str), Some("https://sds"));
    assert_eq!(values.get("max_attempts").map(String::as_str), Some("5"));
    let seen = client.seen.lock().unwrap().clone();
    assert_eq!(seen, vec![None, Some("t1".to_string()), Some("t2".to_string())]);
}

#[test]
fn names_outside_the_path_are_kept_verbatim() {
    let client = ScriptedPages::new(vec![(None, page(&[("/other/name", "x")], None))]);

    let values = collect_parameters(&client, PATH).unwrap();

    assert_eq!(values.get("/other/name").map(String::as_str), Some("x"));
}

#[test]
fn empty_listing_yields_no_parameters() {
    let client = ScriptedPages::new(vec![(None, page(&[], None))]);

    let values = collect_parameters(&client, PATH).unwrap();

    assert!(values.is_empty());
}

#[test]
fn repeated_token_is_rejected() {
    let client = ScriptedPages::new(vec![
        (None, page(&[], Some("loop"))),
        (Some("loop"), page(&[], Some("loop"))),
    ]);

    let err = collect_parameters(&client, PATH).unwrap_err();

    assert!(matches!(err, ParameterError::Pagination(_)));
}

#[test]
fn backend_errors_propagate() {
    let client = ScriptedPages::new(vec![(None, page(&[], Some("missing")))]);

    let err = collect_parameters(&client, PATH).unwrap_err();

    assert_eq!(err, ParameterError::Backend("unknown token".to_string()));
}

// ============================================================================
// SECTION: Blocking Bridge
// ============================================================================

#[test]
fn ssm_calls_block_outside_any_runtime() {
    let runtime = Runtime::new().unwrap();

    let value = block_on_ssm(&runtime, async { Ok(7) }).unwrap();

    assert_eq!(value, 7);
}

#[test]
fn ssm_calls_block_inside_current_thread_runtime() {
    let client_runtime = Runtime::new().unwrap();
    let service_runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

    let value = service_runtime.block_on(async {
        block_on_ssm(&client_runtime, async {
            tokio::task::yield_now().await;
            Ok("raster-create")
        })
    });

    assert_eq!(value.unwrap(), "raster-create");
}

#[test]
fn ssm_calls_block_inside_multi_thread_runtime() {
    let client_runtime = Runtime::new().unwrap();
    let service_runtime =
        tokio::runtime::Builder::new_multi_thread().worker_threads(1).build().unwrap();

    let result = service_runtime.block_on(async {
        block_on_ssm(&client_runtime, async {
            Err::<(), _>(ParameterError::Backend("throttled".to_string()))
        })
    });

    assert_eq!(result.unwrap_err(), ParameterError::Backend("throttled".to_string()));
}
