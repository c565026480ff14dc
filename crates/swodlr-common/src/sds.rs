// crates/swodlr-common/src/sds.rs
// ============================================================================
// Module: SDS Client
// Description: Authenticated client for the Science Data System endpoints.
// Purpose: Resolve the latest job-spec version published to Mozart.
// Dependencies: reqwest, serde, serde_json
// ============================================================================

//! ## Overview
//! The SDS exposes its Mozart Elasticsearch index of job specs behind
//! `{sds_host}/mozart_es/`. [`SdsClient`] authenticates every request with
//! basic auth, optionally trusts a private CA, and bounds response sizes.
//! Credentials stay inside the client; they are never exposed or logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::io::Read;
use std::time::Duration;

use reqwest::Certificate;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::params::ParameterSource;
use crate::semver::SemVer;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Parameter holding the SDS base URL.
pub const SDS_HOST_PARAM: &str = "sds_host";
/// Parameter holding the SDS username.
pub const SDS_USERNAME_PARAM: &str = "sds_username";
/// Parameter holding the SDS password.
pub const SDS_PASSWORD_PARAM: &str = "sds_password";
/// Parameter holding an optional PEM CA certificate.
pub const SDS_CA_CERT_PARAM: &str = "sds_ca_cert";
/// Parameter pinning the PCM release tag used as job version.
pub const SDS_RELEASE_TAG_PARAM: &str = "sds_pcm_release_tag";
/// Elasticsearch index holding job specs.
pub const JOB_SPECS_INDEX: &str = "job_specs";
/// Field holding a job spec's version label.
pub const JOB_VERSION_FIELD: &str = "job-version";
/// Maximum number of job-spec hits requested per search.
pub const JOB_SPEC_SEARCH_SIZE: usize = 1_000;
/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default maximum response size.
const DEFAULT_MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// SDS client errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdsError {
    /// Settings are missing or malformed.
    #[error("sds config invalid: {0}")]
    Config(String),
    /// Transport failure.
    #[error("sds request failed: {0}")]
    Request(String),
    /// Non-success HTTP status.
    #[error("sds returned status {status} for {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Request URL.
        url: String,
    },
    /// Response exceeded the size limit or was not the expected JSON.
    #[error("sds response invalid: {0}")]
    Response(String),
    /// No job spec with a parseable version exists for the job name.
    #[error("job spec not found: {0}")]
    JobSpecNotFound(String),
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Basic-auth credentials for the SDS.
#[derive(Clone, PartialEq, Eq)]
pub struct SdsCredentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl fmt::Debug for SdsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdsCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// SDS connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdsSettings {
    /// SDS base URL (`http` or `https`).
    pub host: Url,
    /// Basic-auth credentials.
    pub credentials: SdsCredentials,
    /// Optional PEM-encoded CA certificate to trust.
    pub ca_cert_pem: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum accepted response body size.
    pub max_response_bytes: usize,
}

impl SdsSettings {
    /// Creates settings with default timeout and size limits.
    ///
    /// # Errors
    ///
    /// Returns [`SdsError::Config`] when the host is not an http(s) URL.
    pub fn new(host: &str, credentials: SdsCredentials) -> Result<Self, SdsError> {
        let host = Url::parse(host.trim())
            .map_err(|err| SdsError::Config(format!("{SDS_HOST_PARAM} invalid: {err}")))?;
        if !matches!(host.scheme(), "http" | "https") {
            return Err(SdsError::Config(format!("{SDS_HOST_PARAM} must use http or https")));
        }
        Ok(Self {
            host,
            credentials,
            ca_cert_pem: None,
            timeout: DEFAULT_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        })
    }

    /// Builds settings from service parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SdsError::Config`] when the host or credentials are missing.
    pub fn from_params(params: &dyn ParameterSource) -> Result<Self, SdsError> {
        let host = required(params, SDS_HOST_PARAM)?;
        let credentials = SdsCredentials {
            username: required(params, SDS_USERNAME_PARAM)?,
            password: required(params, SDS_PASSWORD_PARAM)?,
        };
        let mut settings = Self::new(&host, credentials)?;
        settings.ca_cert_pem = params.get(SDS_CA_CERT_PARAM);
        Ok(settings)
    }
}

/// Reads a required parameter.
fn required(params: &dyn ParameterSource, name: &str) -> Result<String, SdsError> {
    params.get(name).ok_or_else(|| SdsError::Config(format!("{name} must be set")))
}

// ============================================================================
// SECTION: Latest Job Version
// ============================================================================

/// Result of a latest-job-version lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LatestJobVersion {
    /// A pinned PCM release tag.
    ReleaseTag(String),
    /// The highest-versioned job spec found in Mozart.
    JobSpec {
        /// Parsed version of the job spec.
        version: SemVer,
        /// Raw `job-version` label of the job spec.
        label: String,
        /// Full `_source` document of the job spec.
        source: Value,
    },
}

impl LatestJobVersion {
    /// Returns the version label to submit jobs with.
    #[must_use]
    pub fn version_label(&self) -> &str {
        match self {
            Self::ReleaseTag(tag) => tag,
            Self::JobSpec {
                label, ..
            } => label,
        }
    }
}

/// Picks the job spec with the greatest parseable `job-version`.
///
/// Specs without a semver-like version are skipped; the first of several
/// equal versions wins.
#[must_use]
pub fn select_latest_job_spec(sources: Vec<Value>) -> Option<LatestJobVersion> {
    let mut best: Option<(SemVer, String, Value)> = None;
    for source in sources {
        let Some(label) = source.get(JOB_VERSION_FIELD).and_then(Value::as_str) else {
            continue;
        };
        let Some(version) = SemVer::attempt_parse(label) else {
            continue;
        };
        let replace = best.as_ref().is_none_or(|(current, _, _)| version > *current);
        if replace {
            best = Some((version, label.to_string(), source));
        }
    }
    best.map(|(version, label, source)| LatestJobVersion::JobSpec {
        version,
        label,
        source,
    })
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Elasticsearch search response envelope.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    /// Outer hits object.
    hits: SearchHits,
}

/// Elasticsearch hits object.
#[derive(Debug, Deserialize)]
struct SearchHits {
    /// Matching documents.
    hits: Vec<SearchHit>,
}

/// Single Elasticsearch hit.
#[derive(Debug, Deserialize)]
struct SearchHit {
    /// Stored document.
    #[serde(rename = "_source")]
    source: Value,
}

/// Authenticated SDS client.
pub struct SdsClient {
    /// HTTP client (CA and timeout applied).
    client: Client,
    /// Basic-auth credentials.
    credentials: SdsCredentials,
    /// Mozart Elasticsearch base URL (trailing slash).
    mozart_es: Url,
    /// Maximum accepted response body size.
    max_response_bytes: usize,
}

impl SdsClient {
    /// Builds a client from settings.
    ///
    /// # Errors
    ///
    /// Returns [`SdsError::Config`] when the CA certificate is invalid or the
    /// HTTP client cannot be built.
    pub fn new(settings: SdsSettings) -> Result<Self, SdsError> {
        let mut builder = Client::builder().timeout(settings.timeout);
        if let Some(pem) = &settings.ca_cert_pem {
            let certificate = Certificate::from_pem(pem.as_bytes())
                .map_err(|err| SdsError::Config(format!("{SDS_CA_CERT_PARAM} invalid: {err}")))?;
            builder = builder.add_root_certificate(certificate);
        }
        let client =
            builder.build().map_err(|err| SdsError::Config(format!("http client: {err}")))?;
        let mozart_es = mozart_es_url(&settings.host)?;
        Ok(Self {
            client,
            credentials: settings.credentials,
            mozart_es,
            max_response_bytes: settings.max_response_bytes,
        })
    }

    /// Returns the Mozart Elasticsearch base URL.
    #[must_use]
    pub const fn mozart_es_url(&self) -> &Url {
        &self.mozart_es
    }

    /// Returns the `_source` of every job spec whose id starts with
    /// `{job_name}:`.
    ///
    /// # Errors
    ///
    /// Returns [`SdsError`] on transport, status, or decoding failures.
    pub fn search_job_specs(&self, job_name: &str) -> Result<Vec<Value>, SdsError> {
        let url = self
            .mozart_es
            .join(&format!("{JOB_SPECS_INDEX}/_search"))
            .map_err(|err| SdsError::Config(err.to_string()))?;
        let body = json!({
            "size": JOB_SPEC_SEARCH_SIZE,
            "query": {
                "prefix": {
                    "id.keyword": {
                        "value": format!("{job_name}:")
                    }
                }
            }
        });
        let mut response = self
            .client
            .post(url.clone())
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .json(&body)
            .send()
            .map_err(|err| SdsError::Request(err.without_url().to_string()))?;
        if !response.status().is_success() {
            return Err(SdsError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        let bytes = read_response_limited(&mut response, self.max_response_bytes)?;
        let parsed: SearchResponse = serde_json::from_slice(&bytes)
            .map_err(|err| SdsError::Response(format!("search response: {err}")))?;
        tracing::debug!(job_name, hits = parsed.hits.hits.len(), "searched job specs");
        Ok(parsed.hits.hits.into_iter().map(|hit| hit.source).collect())
    }

    /// Returns the highest-versioned job spec for a job name.
    ///
    /// # Errors
    ///
    /// Returns [`SdsError::JobSpecNotFound`] when no spec (or no spec with a
    /// parseable version) exists, or any search error.
    pub fn latest_job_spec(&self, job_name: &str) -> Result<LatestJobVersion, SdsError> {
        let sources = self.search_job_specs(job_name)?;
        if sources.is_empty() {
            return Err(SdsError::JobSpecNotFound(job_name.to_string()));
        }
        select_latest_job_spec(sources).ok_or_else(|| SdsError::JobSpecNotFound(job_name.to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Derives `{host path}/mozart_es/` from the SDS host, keeping any base path.
fn mozart_es_url(host: &Url) -> Result<Url, SdsError> {
    let mut base = host.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("mozart_es/").map_err(|err| SdsError::Config(err.to_string()))
}

/// Reads the response body while enforcing a byte limit.
fn read_response_limited(response: &mut Response, max_bytes: usize) -> Result<Vec<u8>, SdsError> {
    let max_bytes_u64 = u64::try_from(max_bytes)
        .map_err(|_| SdsError::Response("response size limit exceeds u64".to_string()))?;
    if let Some(expected) = response.content_length()
        && expected > max_bytes_u64
    {
        return Err(SdsError::Response("response exceeds size limit".to_string()));
    }
    let mut buf = Vec::new();
    response
        .take(max_bytes_u64.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|err| SdsError::Response(format!("failed to read response: {err}")))?;
    if buf.len() > max_bytes {
        return Err(SdsError::Response("response exceeds size limit".to_string()));
    }
    Ok(buf)
}
