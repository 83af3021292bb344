//! In-memory document store backend for doccrud.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `StoreBackend` trait. It is meant for development, testing and small
//! embedded deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Predicate evaluation** - Equality, comparison, `$in`/`$nin`, `$exists` and logical operators
//! - **Update operators** - `$set`, `$unset`, `$inc`, `$push`, `$addToSet`, `$pull`, `$min`, `$max`
//! - **Unique fields** - Optional per-field uniqueness, reported as conflicts
//!
//! # Quick Start
//!
//! ```ignore
//! use doccrud::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = InMemoryStore::builder().unique_field("email").build().await?;
//!     let users = Service::new(ServiceOptions::builder().model(model).build()?);
//!
//!     users.create(doc! { "email": "alice@example.com" }.into(), &Params::new()).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doccrud_memory;

pub mod store;
pub mod evaluator;
mod modifier;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
