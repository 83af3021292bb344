//! Record validation.
//!
//! The service engine validates records through the [`RecordValidator`]
//! trait and treats the validator as a black-box predicate: a record either
//! passes, or it fails with the list of broken rules.
//!
//! [`SchemaValidator`] is the bundled implementation, backed by the
//! `jsonschema` crate. The schema is compiled once at construction, with
//! `format` assertions enabled.
//!
//! Create and update calls use the compiled schema as is. Patch calls use the
//! [`relaxed`](SchemaValidator::relaxed) form, which drops every `required`
//! list since a patch only carries the fields it changes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt::Debug, sync::Arc};

use crate::{
    error::{ServiceError, ServiceResult, ValidationIssue},
    record::Record,
};

/// Keywords whose values map arbitrary names to subschemas.
const SCHEMA_MAPS: &[&str] = &["properties", "patternProperties", "$defs", "definitions", "dependentSchemas"];
/// Keywords whose values are plain data, never subschemas.
const DATA_KEYWORDS: &[&str] = &["enum", "const", "default", "examples"];

/// A compiled validation predicate.
pub trait RecordValidator: Send + Sync + Debug {
    /// Checks one record, returning every failed rule on rejection.
    fn validate(&self, record: &Record) -> Result<(), Vec<ValidationIssue>>;
}

/// Tuning options for [`SchemaValidator`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorOptions {
    /// Report every failed rule instead of stopping at the first one.
    pub all_errors: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self { all_errors: true }
    }
}

/// A validator compiled from a JSON Schema document.
///
/// # Example
///
/// ```ignore
/// use serde_json::json;
/// use doccrud::validate::{SchemaValidator, ValidatorOptions};
///
/// let validator = SchemaValidator::compile(
///     &json!({
///         "type": "object",
///         "required": ["name"],
///         "properties": { "name": { "type": "string", "minLength": 1 } }
///     }),
///     ValidatorOptions::default(),
/// )?;
/// let patch_validator = validator.relaxed()?;
/// ```
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    schema: Arc<Value>,
    validator: Arc<jsonschema::Validator>,
    options: ValidatorOptions,
}

impl SchemaValidator {
    /// Compiles `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Configuration`] if `schema` is not a valid
    /// JSON Schema document.
    pub fn compile(schema: &Value, options: ValidatorOptions) -> ServiceResult<Self> {
        let validator = jsonschema::options()
            .should_validate_formats(true)
            .build(schema)
            .map_err(|e| ServiceError::Configuration(format!("invalid schema: {}", e)))?;

        Ok(Self {
            schema: Arc::new(schema.clone()),
            validator: Arc::new(validator),
            options,
        })
    }

    /// The schema this validator was compiled from.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Compiles a copy of this validator's schema with every `required`
    /// constraint dropped, at any depth.
    pub fn relaxed(&self) -> ServiceResult<Self> {
        let mut schema = self.schema.as_ref().clone();
        strip_required(&mut schema);

        Self::compile(&schema, self.options)
    }
}

impl RecordValidator for SchemaValidator {
    fn validate(&self, record: &Record) -> Result<(), Vec<ValidationIssue>> {
        let instance = serde_json::to_value(record)
            .map_err(|e| vec![ValidationIssue::new("", format!("record is not representable as JSON: {}", e))])?;

        let errors = self
            .validator
            .iter_errors(&instance)
            .map(|error| ValidationIssue::new(error.instance_path.as_str(), error.to_string()));
        let issues = if self.options.all_errors {
            errors.collect::<Vec<_>>()
        } else {
            errors.take(1).collect::<Vec<_>>()
        };

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

fn strip_required(schema: &mut Value) {
    match schema {
        Value::Object(keywords) => {
            if keywords.get("required").is_some_and(Value::is_array) {
                keywords.remove("required");
            }

            for (keyword, value) in keywords.iter_mut() {
                if DATA_KEYWORDS.contains(&keyword.as_str()) {
                    continue;
                }
                match value {
                    Value::Object(subschemas) if SCHEMA_MAPS.contains(&keyword.as_str()) => {
                        subschemas.values_mut().for_each(strip_required);
                    }
                    other => strip_required(other),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_required),
        _ => {}
    }
}
