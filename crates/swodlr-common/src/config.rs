// crates/swodlr-common/src/config.rs
// ============================================================================
// Module: Service Configuration
// Description: Environment-derived identity and deployment settings.
// Purpose: Decide where service parameters come from and how they are named.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A SWODLR service is identified by an application name and a service name.
//! Together with the deployment environment (`SWODLR_ENV`, default `prod`) they
//! determine the SSM parameter path (`/service/{app}/{service}/`) used in
//! production and the environment-variable prefix (`{APP}_`) used everywhere
//! else. Environment values are parsed strictly: invalid UTF-8 and empty values
//! fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;

// ============================================================================
// SECTION: Environment Keys
// ============================================================================

/// Environment variable selecting the deployment environment.
pub const ENV_VAR: &str = "SWODLR_ENV";
/// Environment variable overriding the SSM region.
pub const SSM_REGION_VAR: &str = "SWODLR_SSM_REGION";
/// Environment variable overriding the SSM endpoint.
pub const SSM_ENDPOINT_VAR: &str = "SWODLR_SSM_ENDPOINT";
/// Label of the production environment.
pub const PROD_ENVIRONMENT: &str = "prod";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A setting is missing or malformed.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Deployment environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    /// Production: parameters are read from SSM.
    #[default]
    Prod,
    /// Any other named environment: parameters are read from the process
    /// environment (and an optional `.env` file).
    Named(String),
}

impl Environment {
    /// Parses an environment label.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        let trimmed = label.trim();
        if trimmed == PROD_ENVIRONMENT {
            Self::Prod
        } else {
            Self::Named(trimmed.to_string())
        }
    }

    /// Returns true for the production environment.
    #[must_use]
    pub const fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }

    /// Returns the environment label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Prod => PROD_ENVIRONMENT,
            Self::Named(label) => label.as_str(),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SSM client overrides.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SsmConfig {
    /// Optional region (defaults to the AWS environment).
    pub region: Option<String>,
    /// Optional endpoint URL (for example a local SSM emulator).
    pub endpoint: Option<String>,
}

impl SsmConfig {
    /// Loads SSM overrides from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is not UTF-8 or is empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            region: read_env_nonempty(SSM_REGION_VAR)?,
            endpoint: read_env_nonempty(SSM_ENDPOINT_VAR)?,
        })
    }

    /// Validates SSM overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the endpoint lacks an http(s) scheme.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            let trimmed = endpoint.trim();
            if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
                return Err(ConfigError::Invalid(
                    "ssm endpoint must include http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Identity and deployment settings of a SWODLR service.
///
/// # Invariants
/// - `app_name` and `service_name` are non-empty and contain no `/` once
///   validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Application name (for example `swodlr`).
    pub app_name: String,
    /// Service name within the application.
    pub service_name: String,
    /// Deployment environment.
    pub environment: Environment,
    /// SSM client overrides.
    pub ssm: SsmConfig,
}

impl ServiceConfig {
    /// Builds a config for the named service, reading the environment from
    /// `SWODLR_ENV` and SSM overrides from their variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an environment value is invalid.
    pub fn new(
        app_name: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let environment =
            read_env_nonempty(ENV_VAR)?.map_or(Environment::Prod, |label| Environment::parse(&label));
        let config = Self {
            app_name: app_name.into(),
            service_name: service_name.into(),
            environment,
            ssm: SsmConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Builds a config with an explicit environment and no SSM overrides.
    #[must_use]
    pub fn with_environment(
        app_name: impl Into<String>,
        service_name: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            service_name: service_name.into(),
            environment,
            ssm: SsmConfig::default(),
        }
    }

    /// Validates the service identity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a name is empty or contains `/`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_name("app_name", &self.app_name)?;
        validate_name("service_name", &self.service_name)?;
        self.ssm.validate()
    }

    /// Returns the SSM path holding this service's parameters.
    #[must_use]
    pub fn ssm_path(&self) -> String {
        format!("/service/{}/{}/", self.app_name, self.service_name)
    }

    /// Returns the environment-variable prefix for parameters.
    #[must_use]
    pub fn env_prefix(&self) -> String {
        format!("{}_", self.app_name.to_uppercase())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates a single identity segment.
fn validate_name(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be set")));
    }
    if value.contains('/') {
        return Err(ConfigError::Invalid(format!("{field} must not contain '/'")));
    }
    Ok(())
}

/// Reads an environment variable and enforces UTF-8 validity.
///
/// # Errors
///
/// Returns [`ConfigError`] when the variable contains invalid UTF-8.
pub fn read_env_strict(name: &str) -> Result<Option<String>, ConfigError> {
    std::env::var_os(name).map_or(Ok(None), |raw| {
        raw.into_string()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{name} must be valid UTF-8")))
    })
}

/// Reads an environment variable and rejects empty values.
fn read_env_nonempty(name: &str) -> Result<Option<String>, ConfigError> {
    match read_env_strict(name)? {
        Some(value) if value.trim().is_empty() => {
            Err(ConfigError::Invalid(format!("{name} must not be empty")))
        }
        Some(value) => Ok(Some(value)),
        None => Ok(None),
    }
}
