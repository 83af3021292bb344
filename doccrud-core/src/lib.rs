//! A generic CRUD service layer over JSON document stores.
//!
//! This crate is the core of the doccrud project and provides:
//!
//! - **Records** ([`record`]) - Record shapes, identifier and timestamp derivation, projection
//! - **Filter translation** ([`filter`]) - Splitting `$sort`/`$limit`/`$skip`/`$select` from predicates
//! - **Pagination** ([`page`]) - Pagination policy and the `{ total, limit, skip, data }` envelope
//! - **Store backend abstraction** ([`backend`]) - The primitive calls a document store must offer
//! - **Predicate AST** ([`query`]) - Parsing store predicates for backends that evaluate them
//! - **Validation** ([`validate`]) - Validator trait and a bundled JSON Schema validator
//! - **Patch payloads** ([`update`]) - Field sets and raw update operators
//! - **Configuration** ([`options`], [`params`]) - Service options and per-call parameters
//! - **Service engine** ([`service`]) - The six record operations
//! - **Error handling** ([`error`]) - Error taxonomy and result types
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use doccrud::{prelude::*, memory::InMemoryStore};
//!
//! let service = Service::new(
//!     ServiceOptions::builder()
//!         .model(InMemoryStore::new())
//!         .id("uuid")
//!         .timestamps(true)
//!         .build()?,
//! );
//!
//! let created = service
//!     .create(doc! { "name": "Alice" }.into(), &Params::new())
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as doccrud_core;

pub mod backend;
pub mod error;
pub mod filter;
pub mod options;
pub mod page;
pub mod params;
pub mod query;
pub mod record;
pub mod service;
pub mod update;
pub mod validate;
