//! Record representation and record-level helpers.
//!
//! Records are plain BSON documents. This module provides the shapes used to
//! pass one or many records through the service, the explicit "all records"
//! target, identifier and timestamp derivation, and field projection.

use bson::{Bson, Document};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stored record: an arbitrary mapping from field name to value.
pub type Record = Document;

/// Name of the identifier field the store generates on insert.
pub const DEFAULT_ID_FIELD: &str = "_id";

/// Number of random bytes behind a generated identifier.
pub const GENERATED_ID_BYTES: usize = 8;

/// Either a single value or an ordered list of values.
///
/// Used for create payloads (single record or bulk insert) and for the
/// results of operations that may affect one or many records.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Returns `true` if this holds a list, even a list of one.
    pub fn is_many(&self) -> bool {
        matches!(self, OneOrMany::Many(_))
    }

    /// Flattens into a list, preserving order.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }

    /// Returns the single value, or `None` if this holds a list.
    pub fn into_one(self) -> Option<T> {
        match self {
            OneOrMany::One(item) => Some(item),
            OneOrMany::Many(_) => None,
        }
    }

    /// Returns the list, or `None` if this holds a single value.
    pub fn into_many(self) -> Option<Vec<T>> {
        match self {
            OneOrMany::One(_) => None,
            OneOrMany::Many(items) => Some(items),
        }
    }

    /// Applies `f` to every contained value, keeping the shape.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> OneOrMany<U> {
        match self {
            OneOrMany::One(item) => OneOrMany::One(f(item)),
            OneOrMany::Many(items) => OneOrMany::Many(items.into_iter().map(f).collect()),
        }
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(item: T) -> Self {
        OneOrMany::One(item)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        OneOrMany::Many(items)
    }
}

/// The record(s) a mutating operation targets.
///
/// `All` addresses every record matching the call's filter; `Id` addresses
/// exactly one record by its identifier value.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Id(Bson),
    All,
}

impl Target {
    pub fn id(&self) -> Option<&Bson> {
        match self {
            Target::Id(id) => Some(id),
            Target::All => None,
        }
    }
}

impl From<Bson> for Target {
    fn from(id: Bson) -> Self {
        Target::Id(id)
    }
}

impl From<&Bson> for Target {
    fn from(id: &Bson) -> Self {
        Target::Id(id.clone())
    }
}

impl From<&str> for Target {
    fn from(id: &str) -> Self {
        Target::Id(Bson::String(id.to_string()))
    }
}

impl From<String> for Target {
    fn from(id: String) -> Self {
        Target::Id(Bson::String(id))
    }
}

impl From<i32> for Target {
    fn from(id: i32) -> Self {
        Target::Id(Bson::Int32(id))
    }
}

impl From<i64> for Target {
    fn from(id: i64) -> Self {
        Target::Id(Bson::Int64(id))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Id(id) => write!(f, "{}", IdDisplay(id)),
            Target::All => write!(f, "*"),
        }
    }
}

/// Displays an identifier value without BSON string quoting.
pub struct IdDisplay<'a>(pub &'a Bson);

impl fmt::Display for IdDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Bson::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", other),
        }
    }
}

/// Generates a random hex-encoded identifier from 8 bytes of randomness.
pub fn generate_id() -> String {
    hex::encode(rand::random::<[u8; GENERATED_ID_BYTES]>())
}

/// Returns the current UTC instant as ISO-8601 text, e.g. `2024-05-01T10:20:30.123Z`.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Looks up a possibly dotted path (`address.city`, `tags.0`) in a record.
pub fn get_path<'a>(record: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;

    for part in parts {
        current = match current {
            Bson::Document(doc) => doc.get(part)?,
            Bson::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Keeps only `fields` (top-level) and the identifier field of a record.
///
/// Field order follows the original record.
pub fn select_fields(record: Record, fields: &[String], id_field: &str) -> Record {
    record
        .into_iter()
        .filter(|(key, _)| key == id_field || fields.iter().any(|field| field == key))
        .collect()
}
