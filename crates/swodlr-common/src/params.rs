// crates/swodlr-common/src/params.rs
// ============================================================================
// Module: Service Parameters
// Description: Parameter sources backed by SSM, the environment, or memory.
// Purpose: Resolve named service parameters independent of deployment.
// Dependencies: aws-config, aws-sdk-ssm, dotenvy, tokio
// ============================================================================

//! ## Overview
//! Services look parameters up by short name (`log_level`, `sds_host`, ...).
//! In production every parameter under `/service/{app}/{service}/` is loaded
//! from SSM once, decrypted, and served from memory. Elsewhere names resolve to
//! `{APP}_{name}` environment variables, optionally seeded from a `.env` file.
//! Parameter values may hold credentials and are never logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc;

use aws_config::BehaviorVersion;
use aws_config::Region;
use tokio::runtime::Handle;
use tokio::runtime::Runtime;
use tokio::runtime::RuntimeFlavor;

use crate::config::ServiceConfig;
use crate::config::SsmConfig;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Upper bound on SSM pages fetched for a single path.
const MAX_SSM_PAGES: usize = 1_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Parameter loading errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    /// The parameter backend rejected a request.
    #[error("parameter backend error: {0}")]
    Backend(String),
    /// Local I/O or runtime failure.
    #[error("parameter io error: {0}")]
    Io(String),
    /// A `.env` file could not be read or parsed.
    #[error("dotenv error: {0}")]
    Dotenv(String),
    /// The backend returned an inconsistent pagination sequence.
    #[error("parameter pagination error: {0}")]
    Pagination(String),
}

// ============================================================================
// SECTION: Parameter Source
// ============================================================================

/// Read-only lookup of service parameters by short name.
pub trait ParameterSource: Send + Sync {
    /// Returns the parameter value, if set.
    fn get(&self, name: &str) -> Option<String>;

    /// Returns a short label for diagnostics.
    fn kind(&self) -> &'static str;
}

/// Builds the parameter source appropriate for the configured environment.
///
/// # Errors
///
/// Returns [`ParameterError`] when SSM loading or `.env` parsing fails.
pub fn load_parameter_source(
    config: &ServiceConfig,
) -> Result<Box<dyn ParameterSource>, ParameterError> {
    if config.environment.is_prod() {
        Ok(Box::new(SsmParameterStore::load(config)?))
    } else {
        Ok(Box::new(EnvParameterSource::new(config)?))
    }
}

// ============================================================================
// SECTION: Static Parameters
// ============================================================================

/// In-memory parameters for tests and explicit overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticParameters {
    /// Parameter values keyed by short name.
    values: BTreeMap<String, String>,
}

impl StaticParameters {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing any previous value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Inserts a parameter, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl ParameterSource for StaticParameters {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    fn kind(&self) -> &'static str {
        "static"
    }
}

// ============================================================================
// SECTION: Environment Parameters
// ============================================================================

/// Parameters resolved from `{APP}_{name}` environment variables.
///
/// # Invariants
/// - `overrides`, when set, replace process environment reads entirely.
/// - Empty values resolve to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvParameterSource {
    /// Variable prefix, `{APP}_`.
    prefix: String,
    /// Optional override map used for deterministic lookups.
    overrides: Option<BTreeMap<String, String>>,
}

impl EnvParameterSource {
    /// Creates an environment source, loading `.env` from the working
    /// directory (or its ancestors) when one exists.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Dotenv`] when a `.env` file exists but cannot
    /// be parsed.
    pub fn new(config: &ServiceConfig) -> Result<Self, ParameterError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
            Err(err) if err.not_found() => {}
            Err(err) => return Err(ParameterError::Dotenv(err.to_string())),
        }
        Ok(Self::without_dotenv(config))
    }

    /// Creates an environment source after loading the given `.env` file.
    ///
    /// Variables already present in the process environment win over the file.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Dotenv`] when the file is missing or malformed.
    pub fn with_dotenv_file(config: &ServiceConfig, path: &Path) -> Result<Self, ParameterError> {
        dotenvy::from_path(path).map_err(|err| ParameterError::Dotenv(err.to_string()))?;
        Ok(Self::without_dotenv(config))
    }

    /// Creates an environment source without touching `.env` files.
    #[must_use]
    pub fn without_dotenv(config: &ServiceConfig) -> Self {
        Self {
            prefix: config.env_prefix(),
            overrides: None,
        }
    }

    /// Creates a source that reads only from the given variables.
    #[must_use]
    pub fn with_overrides(config: &ServiceConfig, overrides: BTreeMap<String, String>) -> Self {
        Self {
            prefix: config.env_prefix(),
            overrides: Some(overrides),
        }
    }

    /// Returns the environment variable name for a parameter.
    #[must_use]
    pub fn variable_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

impl ParameterSource for EnvParameterSource {
    fn get(&self, name: &str) -> Option<String> {
        let key = self.variable_name(name);
        let value = match &self.overrides {
            Some(overrides) => overrides.get(&key).cloned(),
            None => std::env::var(&key).ok(),
        };
        value.filter(|value| !value.is_empty())
    }

    fn kind(&self) -> &'static str {
        "env"
    }
}

// ============================================================================
// SECTION: SSM Parameters
// ============================================================================

/// Parameters loaded from SSM under the service path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsmParameterStore {
    /// SSM path the parameters were loaded from.
    path: String,
    /// Parameter values keyed by name relative to `path`.
    values: BTreeMap<String, String>,
}

impl SsmParameterStore {
    /// Loads every parameter under the service's SSM path.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] when the SSM client cannot be built or a
    /// request fails.
    pub fn load(config: &ServiceConfig) -> Result<Self, ParameterError> {
        let client = AwsSsmClient::new(&config.ssm)?;
        let path = config.ssm_path();
        let values = collect_parameters(&client, &path)?;
        tracing::info!(path = %path, count = values.len(), "loaded parameters from ssm");
        Ok(Self {
            path,
            values,
        })
    }

    /// Returns the SSM path the parameters were loaded from.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the number of loaded parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when no parameters were loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ParameterSource for SsmParameterStore {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    fn kind(&self) -> &'static str {
        "ssm"
    }
}

// ============================================================================
// SECTION: SSM Pagination
// ============================================================================

/// One page of a `GetParametersByPath` listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ParameterPage {
    /// `(full name, value)` pairs on this page.
    pub(crate) parameters: Vec<(String, String)>,
    /// Token for the next page, if any.
    pub(crate) next_token: Option<String>,
}

/// Minimal paginated parameter listing abstraction.
pub(crate) trait ParameterPageClient {
    /// Fetches one page of parameters under `path`.
    fn fetch_page(
        &self,
        path: &str,
        next_token: Option<&str>,
    ) -> Result<ParameterPage, ParameterError>;
}

/// Follows pagination to the end and strips `path` from parameter names.
pub(crate) fn collect_parameters(
    client: &dyn ParameterPageClient,
    path: &str,
) -> Result<BTreeMap<String, String>, ParameterError> {
    let mut values = BTreeMap::new();
    let mut next_token: Option<String> = None;
    for _ in 0 .. MAX_SSM_PAGES {
        let page = client.fetch_page(path, next_token.as_deref())?;
        for (name, value) in page.parameters {
            let relative = name.strip_prefix(path).unwrap_or(name.as_str()).to_string();
            values.insert(relative, value);
        }
        match page.next_token {
            Some(token) if next_token.as_deref() == Some(token.as_str()) => {
                return Err(ParameterError::Pagination("next token repeated".to_string()));
            }
            Some(token) => next_token = Some(token),
            None => return Ok(values),
        }
    }
    Err(ParameterError::Pagination(format!("more than {MAX_SSM_PAGES} pages under {path}")))
}

// ============================================================================
// SECTION: AWS SSM Client
// ============================================================================

/// Drives an SSM SDK future to completion from the synchronous load path.
///
/// Parameters are loaded from plain functions that may themselves be called
/// inside a service's tokio runtime. A multi-thread runtime lends the current
/// worker via `block_in_place`; a current-thread runtime cannot block, so the
/// call moves to a worker thread with its own runtime. Outside any runtime the
/// client's own runtime is used.
fn block_on_ssm<F, T>(runtime: &Runtime, future: F) -> Result<T, ParameterError>
where
    F: Future<Output = Result<T, ParameterError>> + Send + 'static,
    T: Send + 'static,
{
    let Ok(handle) = Handle::try_current() else {
        return runtime.block_on(future);
    };
    match handle.runtime_flavor() {
        RuntimeFlavor::MultiThread => tokio::task::block_in_place(|| handle.block_on(future)),
        _ => block_on_ssm_worker(future),
    }
}

/// Runs an SSM future on a dedicated thread with a fresh runtime.
fn block_on_ssm_worker<F, T>(future: F) -> Result<T, ParameterError>
where
    F: Future<Output = Result<T, ParameterError>> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    std::thread::spawn(move || {
        let result = Runtime::new()
            .map_err(|err| ParameterError::Io(format!("ssm worker runtime: {err}")))
            .and_then(|runtime| runtime.block_on(future));
        let _ = tx.send(result);
    });
    rx.recv().unwrap_or_else(|_| {
        Err(ParameterError::Io("ssm worker thread exited without a result".to_string()))
    })
}

/// SSM-backed page client.
struct AwsSsmClient {
    /// Underlying SSM client.
    client: aws_sdk_ssm::Client,
    /// Tokio runtime for blocking SSM calls.
    runtime: Option<Arc<Runtime>>,
}

impl Drop for AwsSsmClient {
    // A runtime cannot be dropped from within async context.
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = std::thread::spawn(move || drop(runtime));
        }
    }
}

impl AwsSsmClient {
    /// Builds an SSM client from the shared AWS configuration.
    fn new(config: &SsmConfig) -> Result<Self, ParameterError> {
        let runtime = Runtime::new().map_err(|err| ParameterError::Io(err.to_string()))?;
        let region = config.region.clone();
        let endpoint = config.endpoint.clone();
        let shared_config = block_on_ssm(&runtime, async {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = region {
                loader = loader.region(Region::new(region));
            }
            if let Some(endpoint) = endpoint {
                loader = loader.endpoint_url(endpoint);
            }
            Ok(loader.load().await)
        })?;
        Ok(Self {
            client: aws_sdk_ssm::Client::new(&shared_config),
            runtime: Some(Arc::new(runtime)),
        })
    }

    /// Returns the runtime or an error if shut down.
    fn runtime(&self) -> Result<&Runtime, ParameterError> {
        self.runtime
            .as_ref()
            .map(AsRef::as_ref)
            .ok_or_else(|| ParameterError::Io("ssm runtime closed".to_string()))
    }
}

impl ParameterPageClient for AwsSsmClient {
    fn fetch_page(
        &self,
        path: &str,
        next_token: Option<&str>,
    ) -> Result<ParameterPage, ParameterError> {
        let client = self.client.clone();
        let path = path.to_string();
        let next_token = next_token.map(str::to_string);
        block_on_ssm(self.runtime()?, async move {
            let output = client
                .get_parameters_by_path()
                .path(path)
                .with_decryption(true)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|err| ParameterError::Backend(err.to_string()))?;
            let parameters = output
                .parameters()
                .iter()
                .filter_map(|parameter| {
                    Some((parameter.name()?.to_string(), parameter.value()?.to_string()))
                })
                .collect();
            Ok(ParameterPage {
                parameters,
                next_token: output.next_token().map(str::to_string),
            })
        })
    }
}

#[cfg(test)]
mod tests;
