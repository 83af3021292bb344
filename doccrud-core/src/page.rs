//! Pagination policy and the paginated result envelope.
//!
//! A service is *paginated* when its [`PaginationPolicy`] carries a default
//! page size. Paginated `find` calls return a [`Page`], unpaginated ones
//! return the bare list of records.

use serde::{Deserialize, Serialize};

/// A single page of results.
///
/// # Example
///
/// ```ignore
/// use doccrud::page::Page;
///
/// let page = Page::builder(vec!["item1".to_string()])
///     .with_total(100)
///     .with_limit(10)
///     .with_skip(20)
///     .build();
///
/// assert_eq!(page.data.len(), 1);
/// assert_eq!(page.total, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Number of records matching the predicate, ignoring limit and skip.
    pub total: u64,
    /// The effective page size.
    pub limit: usize,
    /// Number of matching records skipped before this page.
    pub skip: usize,
    /// The records of this page, in sort order.
    pub data: Vec<T>,
}

impl<T> Page<T> {
    /// Creates a new builder for constructing a page.
    pub fn builder(data: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(data)
    }

    /// Applies `f` to every record on the page, keeping the metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total: self.total,
            limit: self.limit,
            skip: self.skip,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            total: 0,
            limit: 0,
            skip: 0,
            data: Vec::new(),
        }
    }
}

/// Builder for constructing [`Page`] instances with fluent API.
pub struct PageBuilder<T> {
    data: Vec<T>,
    total: u64,
    limit: usize,
    skip: usize,
}

impl<T> PageBuilder<T> {
    /// Creates a new builder with the given records.
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data,
            total: 0,
            limit: 0,
            skip: 0,
        }
    }

    /// Sets the total count of matching records across all pages.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = total;
        self
    }

    /// Sets the effective page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the number of skipped records.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Builds and returns the final [`Page`] instance.
    pub fn build(self) -> Page<T> {
        Page {
            total: self.total,
            limit: self.limit,
            skip: self.skip,
            data: self.data,
        }
    }
}

/// Page size policy applied to `find` calls.
///
/// Pagination is active only when `default` is set. An absent `$limit` is
/// replaced by `default`, and any limit is clipped to `max` when present.
///
/// # Example
///
/// ```ignore
/// use doccrud::page::PaginationPolicy;
///
/// let policy = PaginationPolicy::new(10, 50);
/// assert_eq!(policy.effective_limit(None), Some(10));
/// assert_eq!(policy.effective_limit(Some(500)), Some(50));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaginationPolicy {
    /// Page size used when the caller gives no `$limit`.
    pub default: Option<usize>,
    /// Upper bound for any page size.
    pub max: Option<usize>,
}

impl PaginationPolicy {
    /// Creates an active policy with a default and a maximum page size.
    pub fn new(default: usize, max: usize) -> Self {
        Self {
            default: Some(default),
            max: Some(max),
        }
    }

    /// Creates a policy that disables pagination.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.default.is_some()
    }

    /// Resolves the limit to use for a requested limit.
    ///
    /// Inactive policies leave the requested limit untouched.
    pub fn effective_limit(&self, requested: Option<usize>) -> Option<usize> {
        match self.default {
            Some(default) => {
                let lower = requested.unwrap_or(default);
                Some(self.max.map_or(lower, |max| lower.min(max)))
            }
            None => requested,
        }
    }
}
