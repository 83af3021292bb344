//! Store backend abstraction consumed by the service engine.
//!
//! The engine only needs five primitive calls from a document store: find,
//! count, insert, update and remove. Each call is a single-shot async
//! operation; the engine chains them sequentially and never issues two at
//! once for the same service call.
//!
//! # Examples
//!
//! ```ignore
//! use doccrud::backend::{StoreBackend, UpdateOptions};
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! backend.insert(vec![doc! { "name": "Alice", "age": 30 }]).await?;
//! let affected = backend
//!     .update(&doc! { "name": "Alice" }, &doc! { "$set": { "age": 31 } }, UpdateOptions::multi())
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use std::fmt::Debug;

use crate::{error::ServiceResult, query::FindQuery, record::Record};

/// Options for [`StoreBackend::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Update every matching record instead of the first one.
    pub multi: bool,
    /// Insert a new record when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn single() -> Self {
        Self::default()
    }

    pub fn multi() -> Self {
        Self {
            multi: true,
            upsert: false,
        }
    }

    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

/// Options for [`StoreBackend::remove`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove every matching record instead of the first one.
    pub multi: bool,
}

impl RemoveOptions {
    pub fn single() -> Self {
        Self { multi: false }
    }

    pub fn multi() -> Self {
        Self { multi: true }
    }
}

/// Abstract interface for document stores.
///
/// Implementers only need per-call atomicity. The engine offers no
/// cross-call transactions, so a record changed by another caller between
/// two calls of the same operation is not detected.
///
/// # Predicates
///
/// Predicates are passed through from callers verbatim. Backends that
/// interpret them themselves can use
/// [`Expr::from_predicate`](crate::query::Expr::from_predicate).
///
/// # Errors
///
/// Operations return [`ServiceResult<T>`](crate::error::ServiceResult). A
/// unique-key violation should be reported as
/// [`ServiceError::Conflict`](crate::error::ServiceError::Conflict), any
/// other failure as [`ServiceError::Backend`](crate::error::ServiceError::Backend).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the records matching the query predicate, sorted, skipped,
    /// limited and projected as directed.
    ///
    /// Without sort keys the order of the result is unspecified.
    async fn find(&self, query: FindQuery) -> ServiceResult<Vec<Record>>;

    /// Counts the records matching `predicate`.
    async fn count(&self, predicate: &Document) -> ServiceResult<u64>;

    /// Inserts records and returns them as stored, including any generated
    /// store key. Either every record is inserted or none is.
    async fn insert(&self, records: Vec<Record>) -> ServiceResult<Vec<Record>>;

    /// Applies `update` to the records matching `predicate`.
    ///
    /// `update` is either a document of update operators (`$set`, `$inc`,
    /// ...) or a whole replacement record. Returns the number of records
    /// updated or upserted.
    async fn update(
        &self,
        predicate: &Document,
        update: &Document,
        options: UpdateOptions,
    ) -> ServiceResult<u64>;

    /// Removes the records matching `predicate` and returns how many were
    /// removed. Removed records are not returned.
    async fn remove(&self, predicate: &Document, options: RemoveOptions) -> ServiceResult<u64>;
}

/// Factory trait for creating store backends.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    /// Builds and returns the configured backend.
    async fn build(self) -> ServiceResult<Self::Backend>;
}
