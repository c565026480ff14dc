// crates/swodlr-common/src/schema.rs
// ============================================================================
// Module: Jobset Schemas
// Description: Embedded JSON schemas and compiled jobset validation.
// Purpose: Reject malformed jobsets at service boundaries.
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! The job and jobset schemas ship inside the crate and are registered under
//! `urn:swodlr:schema:<name>` so that cross-schema `$ref`s resolve without any
//! filesystem or network access. Services validate every jobset they receive
//! and every jobset they emit; see [`JobsetValidator`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use jsonschema::Draft;
use jsonschema::Registry;
use jsonschema::Validator;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::job::Jobset;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix accepted (and ignored) on schema names.
pub const SCHEMA_NAME_PREFIX: &str = "swodlr-";

/// Embedded schema sources keyed by short name.
const EMBEDDED_SCHEMAS: &[(&str, &str)] = &[
    ("job", include_str!("schemas/job.json")),
    ("jobset", include_str!("schemas/jobset.json")),
];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Schema loading and validation errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// No embedded schema has the requested name.
    #[error("schema not found: {0}")]
    NotFound(String),
    /// An embedded schema failed to parse, register, or compile.
    #[error("schema compilation failed: {0}")]
    Compile(String),
    /// An instance violated the schema.
    #[error("schema validation failed: {0}")]
    Invalid(String),
    /// A schema-valid instance could not be decoded into the typed model.
    #[error("jobset decode failed: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Registry of the embedded schemas.
///
/// # Invariants
/// - Every embedded schema is registered under its `$id`.
pub struct SchemaCatalog {
    /// Parsed schema documents keyed by short name.
    schemas: BTreeMap<&'static str, Value>,
    /// Registry used to resolve cross-schema references.
    registry: Registry,
}

impl SchemaCatalog {
    /// Parses and registers every embedded schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Compile`] when an embedded schema is malformed.
    pub fn load() -> Result<Self, SchemaError> {
        let mut schemas = BTreeMap::new();
        let mut resources = Vec::new();
        for (name, source) in EMBEDDED_SCHEMAS {
            let schema: Value = serde_json::from_str(source)
                .map_err(|err| SchemaError::Compile(format!("{name}: {err}")))?;
            let Some(id) = schema.get("$id").and_then(Value::as_str) else {
                return Err(SchemaError::Compile(format!("{name}: schema missing $id")));
            };
            resources.push((id.to_string(), Draft::Draft202012.create_resource(schema.clone())));
            schemas.insert(*name, schema);
        }
        let registry = Registry::try_from_resources(resources)
            .map_err(|err| SchemaError::Compile(err.to_string()))?;
        Ok(Self {
            schemas,
            registry,
        })
    }

    /// Returns the short names of every embedded schema.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().copied()
    }

    /// Returns the raw schema document for a name.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotFound`] for unknown names.
    pub fn schema(&self, name: &str) -> Result<&Value, SchemaError> {
        self.schemas
            .get(normalize_schema_name(name))
            .ok_or_else(|| SchemaError::NotFound(name.to_string()))
    }

    /// Compiles the named schema against the registry.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotFound`] for unknown names and
    /// [`SchemaError::Compile`] when compilation fails.
    pub fn compile(&self, name: &str) -> Result<Validator, SchemaError> {
        let schema = self.schema(name)?;
        jsonschema::options()
            .with_draft(Draft::Draft202012)
            .with_registry(self.registry.clone())
            .build(schema)
            .map_err(|err| SchemaError::Compile(format!("{name}: {err}")))
    }

    /// Compiles the jobset validator.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the jobset schema cannot be compiled.
    pub fn jobset_validator(&self) -> Result<JobsetValidator, SchemaError> {
        Ok(JobsetValidator {
            validator: self.compile("jobset")?,
        })
    }
}

/// Strips the optional `swodlr-` prefix from a schema name.
#[must_use]
pub fn normalize_schema_name(name: &str) -> &str {
    name.strip_prefix(SCHEMA_NAME_PREFIX).unwrap_or(name)
}

// ============================================================================
// SECTION: Jobset Validator
// ============================================================================

/// Compiled jobset validator.
pub struct JobsetValidator {
    /// Compiled jobset schema.
    validator: Validator,
}

impl JobsetValidator {
    /// Compiles a standalone validator from the embedded schemas.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the embedded schemas fail to compile.
    pub fn new() -> Result<Self, SchemaError> {
        SchemaCatalog::load()?.jobset_validator()
    }

    /// Checks an instance against the jobset schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] listing every violation.
    pub fn check(&self, instance: &Value) -> Result<(), SchemaError> {
        let messages: Vec<String> =
            self.validator.iter_errors(instance).map(|err| err.to_string()).collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Invalid(messages.join("; ")))
        }
    }

    /// Validates an instance and decodes it into a [`Jobset`].
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] on schema violations and
    /// [`SchemaError::Decode`] when the typed model rejects the instance.
    pub fn validate(&self, instance: &Value) -> Result<Jobset, SchemaError> {
        self.check(instance)?;
        Jobset::deserialize(instance).map_err(|err| SchemaError::Decode(err.to_string()))
    }

    /// Serializes a typed jobset and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when serialization or validation fails.
    pub fn validate_jobset(&self, jobset: &Jobset) -> Result<Value, SchemaError> {
        let value =
            serde_json::to_value(jobset).map_err(|err| SchemaError::Decode(err.to_string()))?;
        self.check(&value)?;
        Ok(value)
    }
}
