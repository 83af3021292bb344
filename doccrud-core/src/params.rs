//! Per-call parameters.

use bson::Document;

use crate::page::PaginationPolicy;

/// Parameters accompanying a single service call.
///
/// # Example
///
/// ```ignore
/// use bson::doc;
/// use doccrud::params::Params;
///
/// let params = Params::query(doc! { "done": false, "$sort": { "createdAt": -1 } })
///     .without_pagination();
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    /// The filter: predicate clauses plus `$sort`, `$limit`, `$skip`, `$select`.
    pub query: Document,
    /// Overrides the service's pagination policy for this call.
    pub paginate: Option<PaginationPolicy>,
    /// Lets `update` insert the record when its identifier matches nothing.
    pub upsert: bool,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates parameters carrying `query`.
    pub fn query(query: Document) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }

    /// Uses `paginate` instead of the service policy.
    pub fn with_paginate(mut self, paginate: PaginationPolicy) -> Self {
        self.paginate = Some(paginate);
        self
    }

    /// Disables pagination for this call.
    pub fn without_pagination(self) -> Self {
        self.with_paginate(PaginationPolicy::disabled())
    }

    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}
