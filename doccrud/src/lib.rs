//! Generic CRUD services over embedded JSON document stores.
//!
//! This crate is the entry point of the doccrud project. It re-exports the
//! service engine from `doccrud-core` and the bundled in-memory store.
//!
//! A [`Service`](service::Service) exposes six operations over one
//! collection: `find`, `get`, `create`, `update`, `patch` and `remove`.
//! Callers pass a filter document whose `$sort`, `$limit`, `$skip` and
//! `$select` keys control the query, while every other key is handed to the
//! store as a predicate.
//!
//! # Quick Start
//!
//! ```ignore
//! use doccrud::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> ServiceResult<()> {
//!     let todos = Service::new(
//!         ServiceOptions::builder()
//!             .model(InMemoryStore::new())
//!             .paginate(PaginationPolicy::new(10, 50))
//!             .timestamps(true)
//!             .schema(json!({
//!                 "type": "object",
//!                 "properties": {
//!                     "title": { "type": "string" },
//!                     "done": { "type": "boolean" }
//!                 },
//!                 "required": ["title"]
//!             }))
//!             .build()?,
//!     );
//!
//!     let created = todos
//!         .create(doc! { "title": "Write docs", "done": false }.into(), &Params::new())
//!         .await?;
//!
//!     let open = todos
//!         .find(&Params::query(doc! { "done": false, "$sort": { "createdAt": -1 } }))
//!         .await?;
//!
//!     println!("{:?} {:?}", created, open.page().map(|page| page.total));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Partial updates
//!
//! `patch` accepts plain fields, which are set, alongside raw update
//! operators, which are passed through to the store:
//!
//! ```ignore
//! todos
//!     .patch(
//!         Target::All,
//!         doc! { "done": true, "$inc": { "revision": 1 } },
//!         &Params::query(doc! { "done": false }),
//!     )
//!     .await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development, tests and small deployments
//!
//! Other stores plug in by implementing [`StoreBackend`](backend::StoreBackend).

pub mod prelude;

pub use doccrud_core::{backend, error, filter, options, page, params, query, record, service, update, validate};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use doccrud_memory::{InMemoryStore, InMemoryStoreBuilder};
}
