//! Service configuration.
//!
//! [`ServiceOptions`] is built once, validated at construction, and then
//! shared immutably by every call a service handles.
//!
//! # Example
//!
//! ```ignore
//! use doccrud::{options::ServiceOptions, page::PaginationPolicy};
//! use serde_json::json;
//!
//! let options = ServiceOptions::builder()
//!     .model(store)
//!     .id("uuid")
//!     .paginate(PaginationPolicy::new(10, 50))
//!     .timestamps(true)
//!     .schema(json!({ "type": "object", "required": ["name"] }))
//!     .build()?;
//! ```

use serde_json::Value;
use std::{fmt, sync::Arc};

use crate::{
    backend::StoreBackend,
    error::{ServiceError, ServiceResult},
    page::PaginationPolicy,
    record::DEFAULT_ID_FIELD,
    validate::{RecordValidator, SchemaValidator, ValidatorOptions},
};

pub const DEFAULT_CREATED_TIMESTAMP: &str = "createdAt";
pub const DEFAULT_UPDATED_TIMESTAMP: &str = "updatedAt";

/// Which timestamp fields writes stamp, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampPolicy {
    pub enabled: bool,
    /// Field stamped on create.
    pub created_field: String,
    /// Field stamped on create, update and patch.
    pub updated_field: String,
}

impl Default for TimestampPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            created_field: DEFAULT_CREATED_TIMESTAMP.to_string(),
            updated_field: DEFAULT_UPDATED_TIMESTAMP.to_string(),
        }
    }
}

/// The validators a service runs before writing.
///
/// `create` guards create and update calls; `patch` guards patch calls and
/// normally tolerates missing required fields.
#[derive(Clone, Default)]
pub struct Validators {
    pub create: Option<Arc<dyn RecordValidator>>,
    pub patch: Option<Arc<dyn RecordValidator>>,
}

impl fmt::Debug for Validators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validators")
            .field("create", &self.create.is_some())
            .field("patch", &self.patch.is_some())
            .finish()
    }
}

/// Immutable configuration of one service instance.
#[derive(Debug)]
pub struct ServiceOptions<B: StoreBackend> {
    pub(crate) model: Arc<B>,
    pub(crate) id: String,
    pub(crate) paginate: PaginationPolicy,
    pub(crate) timestamps: TimestampPolicy,
    pub(crate) validators: Validators,
    pub(crate) events: Vec<String>,
}

impl<B: StoreBackend> ServiceOptions<B> {
    /// Creates a new options builder.
    pub fn builder() -> ServiceOptionsBuilder<B> {
        ServiceOptionsBuilder::new()
    }

    pub fn model(&self) -> &Arc<B> {
        &self.model
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn paginate(&self) -> &PaginationPolicy {
        &self.paginate
    }

    pub fn timestamps(&self) -> &TimestampPolicy {
        &self.timestamps
    }

    pub fn validators(&self) -> &Validators {
        &self.validators
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }
}

/// Builder for [`ServiceOptions`].
pub struct ServiceOptionsBuilder<B: StoreBackend> {
    model: Option<Arc<B>>,
    id: Option<String>,
    paginate: PaginationPolicy,
    timestamps: TimestampPolicy,
    schema: Option<Value>,
    validator_options: ValidatorOptions,
    validators: Validators,
    events: Vec<String>,
}

impl<B: StoreBackend> ServiceOptionsBuilder<B> {
    pub fn new() -> Self {
        Self {
            model: None,
            id: None,
            paginate: PaginationPolicy::disabled(),
            timestamps: TimestampPolicy::default(),
            schema: None,
            validator_options: ValidatorOptions::default(),
            validators: Validators::default(),
            events: Vec::new(),
        }
    }

    /// Sets the store handle. Required.
    pub fn model(mut self, model: B) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    /// Sets a store handle that is shared with other owners.
    pub fn shared_model(mut self, model: Arc<B>) -> Self {
        self.model = Some(model);
        self
    }

    /// Sets the identifier field name. Defaults to `_id`.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn paginate(mut self, paginate: PaginationPolicy) -> Self {
        self.paginate = paginate;
        self
    }

    /// Enables or disables created/updated timestamps.
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps.enabled = enabled;
        self
    }

    pub fn created_timestamp(mut self, field: impl Into<String>) -> Self {
        self.timestamps.created_field = field.into();
        self
    }

    pub fn updated_timestamp(mut self, field: impl Into<String>) -> Self {
        self.timestamps.updated_field = field.into();
        self
    }

    /// Sets a JSON Schema to compile into the create and patch validators.
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Tunes the validators compiled from [`schema`](Self::schema).
    pub fn validator_options(mut self, options: ValidatorOptions) -> Self {
        self.validator_options = options;
        self
    }

    /// Plugs in custom validators instead of a compiled schema.
    pub fn validators(
        mut self,
        create: Arc<dyn RecordValidator>,
        patch: Arc<dyn RecordValidator>,
    ) -> Self {
        self.validators = Validators {
            create: Some(create),
            patch: Some(patch),
        };
        self
    }

    /// Declares the events this service emits. Emission itself is up to the host.
    pub fn events(mut self, events: Vec<String>) -> Self {
        self.events = events;
        self
    }

    /// Validates the configuration and builds the options.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Configuration`] when no model was given, when
    /// a field name is empty, when both a schema and custom validators were
    /// given, or when the schema does not compile.
    pub fn build(self) -> ServiceResult<ServiceOptions<B>> {
        let model = self
            .model
            .ok_or_else(|| ServiceError::Configuration("You must provide a Model".to_string()))?;

        let id = self.id.unwrap_or_else(|| DEFAULT_ID_FIELD.to_string());
        if id.is_empty() {
            return Err(ServiceError::Configuration("id field name must not be empty".to_string()));
        }
        if self.timestamps.enabled
            && (self.timestamps.created_field.is_empty() || self.timestamps.updated_field.is_empty())
        {
            return Err(ServiceError::Configuration(
                "timestamp field names must not be empty".to_string(),
            ));
        }

        let validators = match self.schema {
            Some(_) if self.validators.create.is_some() => {
                return Err(ServiceError::Configuration(
                    "provide either a schema or custom validators, not both".to_string(),
                ));
            }
            Some(schema) => {
                let create = SchemaValidator::compile(&schema, self.validator_options)?;
                let patch = create.relaxed()?;

                Validators {
                    create: Some(Arc::new(create)),
                    patch: Some(Arc::new(patch)),
                }
            }
            None => self.validators,
        };

        Ok(ServiceOptions {
            model,
            id,
            paginate: self.paginate,
            timestamps: self.timestamps,
            validators,
            events: self.events,
        })
    }
}

impl<B: StoreBackend> Default for ServiceOptionsBuilder<B> {
    fn default() -> Self {
        Self::new()
    }
}
