//! Error types and result types for service operations.
//!
//! This module provides the error taxonomy shared by the service engine, its
//! store backends and its validators. Use [`ServiceResult<T>`] as the return
//! type for fallible operations.

use std::fmt;

use bson::error::Error as BsonError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// A single failed validation rule.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Location of the offending value, e.g. `/name` or `/0/tags/1`.
    pub path: String,
    /// Human readable description of the failed rule.
    pub message: String,
}

impl ValidationIssue {
    /// Creates a new validation issue.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns this issue with `prefix` prepended to its path.
    pub fn prefixed(self, prefix: &str) -> Self {
        Self {
            path: format!("{}{}", prefix, self.path),
            message: self.message,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// An ordered, aggregated list of validation issues.
///
/// Issues keep the order in which they were detected, so a batch of records
/// reports its problems in input order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationErrors {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    /// Creates an error list holding one issue.
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue::new(path, message)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");

        write!(f, "{}", joined)
    }
}

/// Represents all possible errors that can occur when calling a service.
///
/// Every variant rejects the whole operation. Nothing is retried, and backend
/// failures are propagated to the caller unchanged.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// No record matched the requested identifier.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The call itself is malformed, e.g. replacing multiple records at once.
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// One or more records (or filter directives) failed validation.
    /// Always raised before the first store write of the call.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    /// The service was constructed with missing or invalid options.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The store rejected a write because it would violate a unique key.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// An error occurred in the underlying store.
    #[error("Backend error: {0}")]
    Backend(String),
    /// Serialization/deserialization error when converting between formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ServiceError {
    /// Creates the error returned when `id` matches no record.
    pub fn not_found(id: impl fmt::Display) -> Self {
        ServiceError::NotFound(format!("No record found for id '{}'", id))
    }
}

/// A specialized `Result` type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        ServiceError::Validation(errors)
    }
}

impl From<BsonError> for ServiceError {
    fn from(err: BsonError) -> Self {
        ServiceError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for ServiceError {
    fn from(err: SerdeJsonError) -> Self {
        ServiceError::Serialization(err.to_string())
    }
}
