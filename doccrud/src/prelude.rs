//! Convenient re-exports of commonly used types from doccrud.
//!
//! ```ignore
//! use doccrud::prelude::*;
//! ```
//!
//! This provides access to the service and its trait, service options and
//! per-call parameters, record helpers, store backend traits, and error types.

pub use doccrud_core::{
    service::{CrudService, FindResult, Service},
    options::{ServiceOptions, ServiceOptionsBuilder, TimestampPolicy, Validators},
    params::Params,
    page::{Page, PaginationPolicy},
    record::{OneOrMany, Record, Target},
    backend::{RemoveOptions, StoreBackend, StoreBackendBuilder, UpdateOptions},
    query::{FindQuery, Sort, SortDirection},
    validate::{RecordValidator, SchemaValidator, ValidatorOptions},
    error::{ServiceError, ServiceResult, ValidationErrors, ValidationIssue},
};
