//! In-memory storage implementation for document stores.
//!
//! Records are kept as BSON documents in a HashMap keyed by their `_id`,
//! behind an async-aware read-write lock.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use async_trait::async_trait;
use bson::{Bson, Document};
use mea::rwlock::RwLock;
use tracing::debug;
use uuid::Uuid;

use doccrud_core::{
    backend::{RemoveOptions, StoreBackend, StoreBackendBuilder, UpdateOptions},
    error::{ServiceError, ServiceResult},
    query::{Expr, FindQuery, SortDirection},
    record::{DEFAULT_ID_FIELD, IdDisplay, Record, get_path, select_fields},
};

use crate::{
    evaluator::{DocumentEvaluator, compare_values},
    modifier::Modification,
};


#[derive(Debug, Clone)]
struct Entry {
    /// Insertion sequence, used as the natural order of the collection.
    seq: u64,
    record: Record,
}

#[derive(Debug, Default)]
struct RecordMap {
    next_seq: u64,
    entries: HashMap<String, Entry>,
}

impl RecordMap {
    fn push(&mut self, key: String, record: Record) {
        self.entries.insert(key, Entry { seq: self.next_seq, record });
        self.next_seq += 1;
    }

    /// Keys of the records matching `expr`, in insertion order.
    fn matching(&self, expr: &Expr) -> ServiceResult<Vec<String>> {
        let mut matched = Vec::new();

        for (key, entry) in &self.entries {
            if DocumentEvaluator::matches(&entry.record, expr)? {
                matched.push((entry.seq, key.clone()));
            }
        }
        matched.sort_unstable_by_key(|(seq, _)| *seq);

        Ok(matched.into_iter().map(|(_, key)| key).collect())
    }
}

fn store_key(id: &Bson) -> String {
    id.to_string()
}


/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so
/// clones share the same records. Every call holds the lock for its whole
/// duration, which makes each call atomic.
///
/// Records without an `_id` get a generated UUID (simple form) on insert.
/// Without sort keys, queries return records in insertion order.
///
/// # Unique fields
///
/// Fields registered through [`InMemoryStoreBuilder::unique_field`] must hold
/// distinct values across the collection. Missing and null values are not
/// considered. A write that would break this fails with
/// [`ServiceError::Conflict`] and changes nothing.
///
/// # Example
///
/// ```ignore
/// use doccrud_memory::InMemoryStore;
/// use doccrud::backend::{StoreBackend, StoreBackendBuilder};
/// use bson::doc;
///
/// let store = InMemoryStore::builder()
///     .unique_field("email")
///     .build()
///     .await?;
///
/// store.insert(vec![doc! { "email": "a@example.com" }]).await?;
/// assert_eq!(store.count(&doc! {}).await?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    records: Arc<RwLock<RecordMap>>,
    unique_fields: Arc<Vec<String>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store without unique fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryStore` with custom options.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    pub fn unique_fields(&self) -> &[String] {
        &self.unique_fields
    }

    /// Fails when two of `records` share a value for a unique field.
    fn check_unique(&self, records: &[&Record]) -> ServiceResult<()> {
        for field in self.unique_fields.iter() {
            let mut seen = HashSet::new();

            for record in records {
                match get_path(record, field) {
                    None | Some(Bson::Null) => continue,
                    Some(value) => {
                        if !seen.insert(value.to_string()) {
                            return Err(ServiceError::Conflict(format!(
                                "Duplicate value {} for unique field {}",
                                value, field
                            )));
                        }
                    },
                }
            }
        }

        Ok(())
    }

    /// Assigns a generated `_id` when missing and returns the store key.
    fn keyed(record: Record) -> (String, Record) {
        if let Some(id) = record.get(DEFAULT_ID_FIELD) {
            return (store_key(id), record);
        }

        let id = Bson::String(Uuid::new_v4().simple().to_string());
        let mut keyed = Document::new();
        keyed.insert(DEFAULT_ID_FIELD, id.clone());
        for (key, value) in record {
            keyed.insert(key, value);
        }

        (store_key(&id), keyed)
    }

    fn insert_staged(&self, map: &mut RecordMap, records: Vec<Record>) -> ServiceResult<Vec<Record>> {
        let mut staged = Vec::with_capacity(records.len());
        let mut keys = HashSet::new();

        for record in records {
            let (key, record) = Self::keyed(record);

            if map.entries.contains_key(&key) || !keys.insert(key.clone()) {
                let id = record.get(DEFAULT_ID_FIELD).cloned().unwrap_or(Bson::Null);
                return Err(ServiceError::Conflict(format!(
                    "A record with _id '{}' already exists",
                    IdDisplay(&id)
                )));
            }
            staged.push((key, record));
        }

        let all = map
            .entries
            .values()
            .map(|entry| &entry.record)
            .chain(staged.iter().map(|(_, record)| record))
            .collect::<Vec<_>>();
        self.check_unique(&all)?;

        let inserted = staged.iter().map(|(_, record)| record.clone()).collect();
        for (key, record) in staged {
            map.push(key, record);
        }

        Ok(inserted)
    }
}


#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find(&self, query: FindQuery) -> ServiceResult<Vec<Record>> {
        let expr = Expr::from_predicate(&query.predicate)?;
        let map = self.records.read().await;

        let mut matched = map
            .matching(&expr)?
            .into_iter()
            .filter_map(|key| map.entries.get(&key))
            .map(|entry| &entry.record)
            .collect::<Vec<_>>();

        if !query.sort.is_empty() {
            matched.sort_by(|a, b| {
                query
                    .sort
                    .iter()
                    .map(|sort| {
                        let ordering = compare_values(get_path(a, &sort.field), get_path(b, &sort.field));
                        match sort.direction {
                            SortDirection::Asc => ordering,
                            SortDirection::Desc => ordering.reverse(),
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let records = matched
            .into_iter()
            .skip(query.skip.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|record| match &query.projection {
                Some(fields) => select_fields(record.clone(), fields, DEFAULT_ID_FIELD),
                None => record.clone(),
            })
            .collect::<Vec<_>>();

        debug!(returned = records.len(), "found records");

        Ok(records)
    }

    async fn count(&self, predicate: &Document) -> ServiceResult<u64> {
        let expr = Expr::from_predicate(predicate)?;
        let map = self.records.read().await;

        Ok(map.matching(&expr)?.len() as u64)
    }

    async fn insert(&self, records: Vec<Record>) -> ServiceResult<Vec<Record>> {
        let mut map = self.records.write().await;
        let inserted = self.insert_staged(&mut map, records)?;

        debug!(inserted = inserted.len(), "inserted records");

        Ok(inserted)
    }

    async fn update(
        &self,
        predicate: &Document,
        update: &Document,
        options: UpdateOptions,
    ) -> ServiceResult<u64> {
        let expr = Expr::from_predicate(predicate)?;
        let modification = Modification::parse(update)?;
        let mut map = self.records.write().await;

        let mut matched = map.matching(&expr)?;
        if !options.multi {
            matched.truncate(1);
        }

        if matched.is_empty() {
            if !options.upsert {
                return Ok(0);
            }

            let record = modification.upsert_record(predicate)?;
            self.insert_staged(&mut map, vec![record])?;
            debug!("upserted record");

            return Ok(1);
        }

        let mut changed = HashMap::with_capacity(matched.len());
        for key in &matched {
            if let Some(entry) = map.entries.get(key) {
                changed.insert(key.clone(), modification.apply(&entry.record)?);
            }
        }

        let all = map
            .entries
            .iter()
            .map(|(key, entry)| changed.get(key).unwrap_or(&entry.record))
            .collect::<Vec<_>>();
        self.check_unique(&all)?;

        let affected = changed.len() as u64;
        for (key, record) in changed {
            if let Some(entry) = map.entries.get_mut(&key) {
                entry.record = record;
            }
        }

        debug!(affected, "updated records");

        Ok(affected)
    }

    async fn remove(&self, predicate: &Document, options: RemoveOptions) -> ServiceResult<u64> {
        let expr = Expr::from_predicate(predicate)?;
        let mut map = self.records.write().await;

        let mut matched = map.matching(&expr)?;
        if !options.multi {
            matched.truncate(1);
        }

        let removed = matched
            .iter()
            .filter(|key| map.entries.remove(*key).is_some())
            .count() as u64;

        debug!(removed, "removed records");

        Ok(removed)
    }
}


/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use doccrud_memory::InMemoryStore;
/// use doccrud::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder()
///     .unique_field("email")
///     .build()
///     .await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    unique_fields: Vec<String>,
}

impl InMemoryStoreBuilder {
    /// Requires distinct values for `field` across the collection.
    pub fn unique_field(mut self, field: impl Into<String>) -> Self {
        self.unique_fields.push(field.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> ServiceResult<Self::Backend> {
        Ok(InMemoryStore {
            records: Arc::default(),
            unique_fields: Arc::new(self.unique_fields),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert(vec![
                doc! { "_id": "a", "name": "Ada", "age": 36, "team": "red" },
                doc! { "_id": "b", "name": "Bo", "age": 25, "team": "blue" },
                doc! { "_id": "c", "name": "Cy", "age": 41, "team": "red" },
            ])
            .await
            .unwrap();

        store
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records
            .iter()
            .map(|record| record.get_str("_id").unwrap())
            .collect()
    }

    #[tokio::test]
    async fn insert_generates_missing_ids() {
        let store = InMemoryStore::new();
        let inserted = store.insert(vec![doc! { "name": "Ada" }]).await.unwrap();

        let id = inserted[0].get_str("_id").unwrap();
        assert_eq!(id.len(), 32);
        assert_eq!(inserted[0].keys().next().map(String::as_str), Some("_id"));
        assert_eq!(store.count(&doc! { "_id": id }).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_sorts_skips_limits_and_projects() {
        let store = seeded().await;

        let all = store.find(FindQuery::new(doc! {})).await.unwrap();
        assert_eq!(ids(&all), vec!["a", "b", "c"]);

        let query = FindQuery::builder(doc! { "age": { "$gte": 30 } })
            .sort("age", SortDirection::Desc)
            .build();
        assert_eq!(ids(&store.find(query).await.unwrap()), vec!["c", "a"]);

        let query = FindQuery::builder(doc! {})
            .sort("team", SortDirection::Asc)
            .sort("age", SortDirection::Asc)
            .skip(1)
            .limit(1)
            .projection(vec!["name".to_string()])
            .build();
        let page = store.find(query).await.unwrap();
        assert_eq!(page, vec![doc! { "_id": "a", "name": "Ada" }]);
    }

    #[tokio::test]
    async fn duplicate_ids_reject_the_whole_batch() {
        let store = seeded().await;

        let result = store
            .insert(vec![doc! { "_id": "d" }, doc! { "_id": "a" }])
            .await;

        assert!(matches!(result, Err(ServiceError::Conflict(_))));
        assert_eq!(store.count(&doc! {}).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn unique_fields_are_enforced_on_insert_and_update() {
        let store = InMemoryStore::builder()
            .unique_field("email")
            .build()
            .await
            .unwrap();

        store
            .insert(vec![doc! { "_id": 1, "email": "a@x" }, doc! { "_id": 2, "email": "b@x" }, doc! { "_id": 3 }])
            .await
            .unwrap();

        let result = store.insert(vec![doc! { "email": "a@x" }]).await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))));

        let result = store
            .update(&doc! { "_id": 2 }, &doc! { "$set": { "email": "a@x" } }, UpdateOptions::single())
            .await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))));
        assert_eq!(store.count(&doc! { "email": "b@x" }).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_single_multi_and_upsert() {
        let store = seeded().await;

        let affected = store
            .update(&doc! { "team": "red" }, &doc! { "$inc": { "age": 1 } }, UpdateOptions::single())
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(store.count(&doc! { "age": 37 }).await.unwrap(), 1);

        let affected = store
            .update(&doc! { "team": "red" }, &doc! { "$set": { "team": "green" } }, UpdateOptions::multi())
            .await
            .unwrap();
        assert_eq!(affected, 2);
        assert_eq!(store.count(&doc! { "team": "green" }).await.unwrap(), 2);

        let affected = store
            .update(&doc! { "_id": "z" }, &doc! { "$set": { "name": "Zed" } }, UpdateOptions::single())
            .await
            .unwrap();
        assert_eq!(affected, 0);

        let affected = store
            .update(
                &doc! { "_id": "z" },
                &doc! { "$set": { "name": "Zed" } },
                UpdateOptions::single().with_upsert(true),
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let upserted = store.find(FindQuery::new(doc! { "_id": "z" })).await.unwrap();
        assert_eq!(upserted, vec![doc! { "_id": "z", "name": "Zed" }]);
    }

    #[tokio::test]
    async fn replacement_keeps_the_store_key() {
        let store = seeded().await;

        store
            .update(&doc! { "_id": "b" }, &doc! { "name": "Bea" }, UpdateOptions::single())
            .await
            .unwrap();

        let found = store.find(FindQuery::new(doc! { "_id": "b" })).await.unwrap();
        assert_eq!(found, vec![doc! { "_id": "b", "name": "Bea" }]);
    }

    #[tokio::test]
    async fn remove_single_and_multi() {
        let store = seeded().await;

        let removed = store
            .remove(&doc! { "team": "red" }, RemoveOptions::single())
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let removed = store.remove(&doc! {}, RemoveOptions::multi()).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count(&doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_predicates_are_bad_requests() {
        let store = seeded().await;

        let result = store.count(&doc! { "age": { "$regex": "x" } }).await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
    }
}
