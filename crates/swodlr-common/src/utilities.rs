// crates/swodlr-common/src/utilities.rs
// ============================================================================
// Module: Service Utilities
// Description: Per-service parameter access, schemas, and SDS helpers.
// Purpose: Give every service one handle for its shared dependencies.
// Dependencies: jsonschema, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`Utilities`] bundles a service's configuration, its parameter source, the
//! embedded schema catalog, and a lazily built [`SdsClient`]. Services usually
//! build it once at startup and either pass it explicitly or publish it with
//! [`Utilities::install`] for code that needs process-wide access.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::Duration;

use jsonschema::Validator;
use thiserror::Error;
use tracing::Level;

use crate::config::ConfigError;
use crate::config::ServiceConfig;
use crate::handler::RetryPolicy;
use crate::logging::LoggingConfig;
use crate::logging::LoggingError;
use crate::logging::parse_level;
use crate::params::ParameterError;
use crate::params::ParameterSource;
use crate::params::load_parameter_source;
use crate::schema::JobsetValidator;
use crate::schema::SchemaCatalog;
use crate::schema::SchemaError;
use crate::sds::LatestJobVersion;
use crate::sds::SDS_RELEASE_TAG_PARAM;
use crate::sds::SdsClient;
use crate::sds::SdsError;
use crate::sds::SdsSettings;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Parameter holding the log level name.
pub const LOG_LEVEL_PARAM: &str = "log_level";
/// Parameter selecting the log format (`json` or `text`).
pub const LOG_FORMAT_PARAM: &str = "log_format";
/// Parameter holding the number of retries after the first attempt.
pub const MAX_ATTEMPTS_PARAM: &str = "max_attempts";
/// Legacy alias of [`MAX_ATTEMPTS_PARAM`].
pub const MAX_TRIES_PARAM: &str = "max_tries";
/// Parameter scaling the one-second backoff unit.
pub const BACKOFF_FACTOR_PARAM: &str = "backoff_factor";

/// Process-wide utilities instance.
static INSTANCE: OnceLock<Arc<Utilities>> = OnceLock::new();

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Utilities errors.
#[derive(Debug, Error)]
pub enum UtilitiesError {
    /// Service configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Parameters could not be loaded.
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    /// Schemas could not be loaded or compiled.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// SDS access failed.
    #[error(transparent)]
    Sds(#[from] SdsError),
    /// Logging configuration is invalid.
    #[error(transparent)]
    Logging(#[from] LoggingError),
    /// A parameter value is malformed.
    #[error("parameter {name} invalid: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Parse failure detail.
        reason: String,
    },
    /// [`Utilities::install`] was called twice.
    #[error("utilities were already initialized")]
    AlreadyInitialized,
    /// [`Utilities::instance`] was called before [`Utilities::install`].
    #[error("utilities were not initialized yet")]
    NotInitialized,
    /// Internal lock poisoned.
    #[error("utilities lock poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Utilities
// ============================================================================

/// Shared per-service dependencies.
///
/// # Invariants
/// - The SDS client is built at most once and never exposes its credentials.
pub struct Utilities {
    /// Service identity and environment.
    config: ServiceConfig,
    /// Parameter lookup backend.
    params: Box<dyn ParameterSource>,
    /// Embedded schema catalog.
    schemas: SchemaCatalog,
    /// Lazily built SDS client.
    sds_client: Mutex<Option<Arc<SdsClient>>>,
}

impl Utilities {
    /// Builds utilities, loading parameters for the configured environment.
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError`] when the config is invalid or parameters or
    /// schemas fail to load.
    pub fn new(config: ServiceConfig) -> Result<Self, UtilitiesError> {
        config.validate()?;
        let params = load_parameter_source(&config)?;
        Self::with_source(config, params)
    }

    /// Builds utilities over an explicit parameter source.
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError`] when the config is invalid or schemas fail
    /// to load.
    pub fn with_source(
        config: ServiceConfig,
        params: Box<dyn ParameterSource>,
    ) -> Result<Self, UtilitiesError> {
        config.validate()?;
        tracing::debug!(
            app = %config.app_name,
            service = %config.service_name,
            environment = %config.environment,
            source = params.kind(),
            "service utilities initialized"
        );
        Ok(Self {
            config,
            params,
            schemas: SchemaCatalog::load()?,
            sds_client: Mutex::new(None),
        })
    }

    /// Publishes these utilities as the process-wide instance.
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError::AlreadyInitialized`] when an instance exists.
    pub fn install(self) -> Result<Arc<Self>, UtilitiesError> {
        let shared = Arc::new(self);
        INSTANCE.set(Arc::clone(&shared)).map_err(|_| UtilitiesError::AlreadyInitialized)?;
        Ok(shared)
    }

    /// Returns the process-wide instance.
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError::NotInitialized`] before [`Utilities::install`].
    pub fn instance() -> Result<Arc<Self>, UtilitiesError> {
        INSTANCE.get().cloned().ok_or(UtilitiesError::NotInitialized)
    }

    /// Returns the service configuration.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the parameter source.
    #[must_use]
    pub fn params(&self) -> &dyn ParameterSource {
        self.params.as_ref()
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<String> {
        self.params.get(name)
    }

    /// Returns a parameter parsed into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError::InvalidParameter`] when the value is set but
    /// does not parse.
    pub fn param_parsed<T>(&self, name: &str) -> Result<Option<T>, UtilitiesError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.param(name)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|err| UtilitiesError::InvalidParameter {
                    name: name.to_string(),
                    reason: err.to_string(),
                })
            })
            .transpose()
    }

    /// Returns the configured log level (INFO when unset).
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError::Logging`] for unknown level names.
    pub fn log_level(&self) -> Result<Level, UtilitiesError> {
        self.param(LOG_LEVEL_PARAM).map_or(Ok(Level::INFO), |raw| Ok(parse_level(&raw)?))
    }

    /// Returns the logging configuration for this service.
    ///
    /// JSON output is used in production or when `log_format=json`.
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError::Logging`] for unknown level names.
    pub fn logging_config(&self) -> Result<LoggingConfig, UtilitiesError> {
        let json_requested = self
            .param(LOG_FORMAT_PARAM)
            .is_some_and(|format| format.trim().eq_ignore_ascii_case("json"));
        Ok(LoggingConfig {
            level: self.log_level()?,
            json_format: self.config.environment.is_prod() || json_requested,
            include_target: true,
        })
    }

    /// Returns the retry policy from `max_attempts` (or `max_tries`) and
    /// `backoff_factor`.
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError::InvalidParameter`] for malformed values.
    pub fn retry_policy(&self) -> Result<RetryPolicy, UtilitiesError> {
        let defaults = RetryPolicy::default();
        let max_attempts = match self.param_parsed::<u32>(MAX_ATTEMPTS_PARAM)? {
            Some(value) => value,
            None => self.param_parsed::<u32>(MAX_TRIES_PARAM)?.unwrap_or(defaults.max_attempts),
        };
        let backoff_unit = match self.param_parsed::<f64>(BACKOFF_FACTOR_PARAM)? {
            Some(factor) => Duration::try_from_secs_f64(factor).map_err(|err| {
                UtilitiesError::InvalidParameter {
                    name: BACKOFF_FACTOR_PARAM.to_string(),
                    reason: err.to_string(),
                }
            })?,
            None => defaults.backoff_unit,
        };
        Ok(RetryPolicy {
            max_attempts,
            backoff_unit,
        })
    }

    /// Returns the schema catalog.
    #[must_use]
    pub const fn schemas(&self) -> &SchemaCatalog {
        &self.schemas
    }

    /// Compiles an embedded schema by name (an optional `swodlr-` prefix is
    /// ignored).
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError::Schema`] for unknown or invalid schemas.
    pub fn load_json_schema(&self, name: &str) -> Result<Validator, UtilitiesError> {
        Ok(self.schemas.compile(name)?)
    }

    /// Compiles the jobset validator.
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError::Schema`] when compilation fails.
    pub fn jobset_validator(&self) -> Result<JobsetValidator, UtilitiesError> {
        Ok(self.schemas.jobset_validator()?)
    }

    /// Returns the SDS client, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError::Sds`] when SDS settings are missing or invalid.
    pub fn sds_client(&self) -> Result<Arc<SdsClient>, UtilitiesError> {
        let mut slot = self.sds_client.lock().map_err(|_| UtilitiesError::Poisoned)?;
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }
        let settings = SdsSettings::from_params(self.params.as_ref())?;
        let client = Arc::new(SdsClient::new(settings)?);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Returns the job version to submit `job_name` with.
    ///
    /// A pinned `sds_pcm_release_tag` wins; otherwise Mozart is searched for
    /// the highest-versioned job spec.
    ///
    /// # Errors
    ///
    /// Returns [`UtilitiesError::Sds`] when the lookup fails.
    pub fn latest_job_version(&self, job_name: &str) -> Result<LatestJobVersion, UtilitiesError> {
        if let Some(tag) = self.param(SDS_RELEASE_TAG_PARAM) {
            return Ok(LatestJobVersion::ReleaseTag(tag));
        }
        Ok(self.sds_client()?.latest_job_spec(job_name)?)
    }
}
