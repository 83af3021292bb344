//! The service engine.
//!
//! A [`Service`] exposes six record operations over a [`StoreBackend`]:
//! `find`, `get`, `create`, `update`, `patch` and `remove`. Each operation is
//! a short sequential pipeline of store calls: translate the caller's
//! filter, validate and derive fields, dispatch to the store, rebuild the
//! result, and project the requested fields.
//!
//! # Multi-record writes
//!
//! `patch` and `remove` accept [`Target::All`] to address every record
//! matching the call's filter. The matching identifiers are resolved once,
//! *before* the write, and both the write and the re-query that follows are
//! scoped to that snapshot. A patch that makes records stop matching the
//! original filter therefore still returns exactly the records it changed.
//!
//! There is no transaction spanning those calls: a concurrent writer that
//! changes a record between the snapshot and the write goes unnoticed.
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
//!         .paginate(PaginationPolicy::new(10, 50))
//!         .build()?,
//! );
//!
//! service.create(doc! { "text": "write docs", "done": false }.into(), &Params::new()).await?;
//!
//! let page = service
//!     .find(&Params::query(doc! { "done": false, "$sort": { "text": 1 } }))
//!     .await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::{
    backend::{RemoveOptions, StoreBackend, UpdateOptions},
    error::{ServiceError, ServiceResult, ValidationErrors, ValidationIssue},
    filter::{SELECT_KEY, TranslatedFilter, translate},
    options::ServiceOptions,
    page::{Page, PaginationPolicy},
    params::Params,
    query::FindQuery,
    record::{
        DEFAULT_ID_FIELD, IdDisplay, OneOrMany, Record, Target, generate_id, now_timestamp,
        select_fields,
    },
    update::PatchUpdate,
    validate::RecordValidator,
};

const NOT_REPLACING_MULTIPLE: &str = "Not replacing multiple records. Did you mean `patch`?";

/// The result of [`find`](CrudService::find).
///
/// The shape depends on whether pagination is active for the call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum FindResult {
    Paginated(Page<Record>),
    Unpaginated(Vec<Record>),
}

impl FindResult {
    /// Returns the records, dropping any page metadata.
    pub fn into_data(self) -> Vec<Record> {
        match self {
            FindResult::Paginated(page) => page.data,
            FindResult::Unpaginated(data) => data,
        }
    }

    pub fn data(&self) -> &[Record] {
        match self {
            FindResult::Paginated(page) => &page.data,
            FindResult::Unpaginated(data) => data,
        }
    }

    pub fn page(&self) -> Option<&Page<Record>> {
        match self {
            FindResult::Paginated(page) => Some(page),
            FindResult::Unpaginated(_) => None,
        }
    }
}

/// The record-access contract a host framework binds to its transports.
#[async_trait]
pub trait CrudService: Send + Sync {
    /// Finds the records matching `params.query`.
    async fn find(&self, params: &Params) -> ServiceResult<FindResult>;

    /// Gets one record by identifier.
    async fn get(&self, id: &Bson, params: &Params) -> ServiceResult<Record>;

    /// Creates one record, or many records in input order.
    async fn create(
        &self,
        data: OneOrMany<Record>,
        params: &Params,
    ) -> ServiceResult<OneOrMany<Record>>;

    /// Replaces one record entirely.
    async fn update(
        &self,
        target: Target,
        data: OneOrMany<Record>,
        params: &Params,
    ) -> ServiceResult<Record>;

    /// Partially updates one record, or every record matching the filter.
    async fn patch(
        &self,
        target: Target,
        data: Record,
        params: &Params,
    ) -> ServiceResult<OneOrMany<Record>>;

    /// Removes one record, or every record matching the filter, returning
    /// what was removed.
    async fn remove(&self, target: Target, params: &Params) -> ServiceResult<OneOrMany<Record>>;
}

/// A CRUD service over one store.
///
/// Cloning is cheap; clones share the same immutable options and store.
#[derive(Debug)]
pub struct Service<B: StoreBackend> {
    options: Arc<ServiceOptions<B>>,
}

impl<B: StoreBackend> Clone for Service<B> {
    fn clone(&self) -> Self {
        Self {
            options: Arc::clone(&self.options),
        }
    }
}

impl<B: StoreBackend> Service<B> {
    /// Creates a service from built options.
    pub fn new(options: ServiceOptions<B>) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    /// Returns the identifier field name.
    pub fn id(&self) -> &str {
        self.options.id()
    }

    /// Returns the store handle.
    pub fn model(&self) -> &Arc<B> {
        self.options.model()
    }

    /// Returns the service's default pagination policy.
    pub fn paginate(&self) -> &PaginationPolicy {
        self.options.paginate()
    }

    /// Returns the declared event names.
    pub fn events(&self) -> &[String] {
        self.options.events()
    }

    pub fn options(&self) -> &ServiceOptions<B> {
        &self.options
    }

    /// Finds the records matching `params.query`.
    ///
    /// With pagination active the result is a [`Page`] whose `total` counts
    /// every match regardless of `$limit` and `$skip`; a `$limit` of zero
    /// returns the total with no data. Without pagination the bare list is
    /// returned.
    ///
    /// Records come back in `$sort` order. Without `$sort` the order is
    /// whatever the store yields and must not be relied upon.
    #[instrument(skip_all, fields(service.id = %self.id()))]
    pub async fn find(&self, params: &Params) -> ServiceResult<FindResult> {
        let policy = params.paginate.unwrap_or(*self.options.paginate());
        let page = self.query_page(&params.query, &policy).await?;

        if policy.is_active() {
            Ok(FindResult::Paginated(page))
        } else {
            Ok(FindResult::Unpaginated(page.data))
        }
    }

    /// Gets the record whose identifier equals `id`.
    ///
    /// Predicate keys in `params.query` must match as well, and `$select`
    /// projects the result.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if no record matches.
    #[instrument(skip_all, fields(service.id = %self.id(), id = %IdDisplay(id)))]
    pub async fn get(&self, id: &Bson, params: &Params) -> ServiceResult<Record> {
        let translated = translate(&params.query, &PaginationPolicy::disabled())?;
        let query = FindQuery {
            predicate: self.scope_to_id(translated.predicate.clone(), id),
            limit: Some(1),
            projection: self.projection(&translated),
            ..Default::default()
        };

        self.options
            .model
            .find(query)
            .await?
            .into_iter()
            .next()
            .map(|record| self.select(record, &translated))
            .ok_or_else(|| ServiceError::not_found(IdDisplay(id)))
    }

    /// Creates one record, or a batch of records.
    ///
    /// Each record gets a generated identifier when the service uses a
    /// custom identifier field and the record has none, and created/updated
    /// timestamps when enabled. The whole batch is validated before the
    /// store is touched; if any record fails, nothing is inserted and every
    /// issue of every record is reported, prefixed with the record's index.
    #[instrument(skip_all, fields(service.id = %self.id(), batch = data.is_many()))]
    pub async fn create(
        &self,
        data: OneOrMany<Record>,
        params: &Params,
    ) -> ServiceResult<OneOrMany<Record>> {
        let translated = translate(&params.query, &PaginationPolicy::disabled())?;
        let is_many = data.is_many();

        let records = data
            .into_vec()
            .into_iter()
            .map(|record| self.prepare_new(record))
            .collect::<Vec<_>>();

        if let Some(validator) = &self.options.validators.create {
            let issues = records
                .iter()
                .enumerate()
                .flat_map(|(index, record)| {
                    let prefix = if is_many { format!("/{}", index) } else { String::new() };
                    collect_issues(validator.as_ref(), record, &prefix)
                })
                .collect::<Vec<_>>();

            reject_invalid(issues)?;
        }

        let inserted = if records.is_empty() {
            Vec::new()
        } else {
            self.options.model.insert(records).await?
        };
        debug!(count = inserted.len(), "inserted records");

        let inserted = inserted
            .into_iter()
            .map(|record| self.select(record, &translated))
            .collect::<Vec<_>>();

        if is_many {
            return Ok(OneOrMany::Many(inserted));
        }

        inserted
            .into_iter()
            .next()
            .map(OneOrMany::One)
            .ok_or_else(|| ServiceError::Backend("store inserted no record".to_string()))
    }

    /// Replaces the record identified by `target` with `data`.
    ///
    /// Any identifier in `data` is discarded. The identifier is written back
    /// from `target` when the service uses a custom identifier field, or when
    /// `params.upsert` is set (in which case a missing record is created).
    /// `data` is validated as strictly as on create.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::BadRequest`] for [`Target::All`] or a list
    /// payload, without touching the store, and [`ServiceError::NotFound`]
    /// when nothing was replaced.
    #[instrument(skip_all, fields(service.id = %self.id(), target = %target))]
    pub async fn update(
        &self,
        target: Target,
        data: OneOrMany<Record>,
        params: &Params,
    ) -> ServiceResult<Record> {
        let (id, mut entry) = match (target, data) {
            (Target::Id(id), OneOrMany::One(entry)) => (id, entry),
            _ => return Err(ServiceError::BadRequest(NOT_REPLACING_MULTIPLE.to_string())),
        };
        let translated = translate(&params.query, &PaginationPolicy::disabled())?;
        let id_field = self.id();

        entry.remove(DEFAULT_ID_FIELD);
        entry.remove(id_field);
        if id_field != DEFAULT_ID_FIELD || params.upsert {
            entry.insert(id_field, id.clone());
        }

        let timestamps = &self.options.timestamps;
        if timestamps.enabled {
            entry.insert(timestamps.updated_field.clone(), now_timestamp());
        }

        if let Some(validator) = &self.options.validators.create {
            reject_invalid(collect_issues(validator.as_ref(), &entry, ""))?;
        }

        let affected = self
            .options
            .model
            .update(
                &self.scope_to_id(translated.predicate.clone(), &id),
                &entry,
                UpdateOptions::single().with_upsert(params.upsert),
            )
            .await?;
        debug!(affected, "replaced record");

        if affected == 0 {
            return Err(ServiceError::not_found(IdDisplay(&id)));
        }

        self.get(&id, &self.requery_params(vec![id.clone()], &translated))
            .await
    }

    /// Applies a partial update.
    ///
    /// Plain fields of `data` are set; `$`-prefixed keys are passed to the
    /// store as update operators. The identifier field is never changed.
    /// The plain fields are validated against the relaxed patch validator
    /// before anything is read or written.
    ///
    /// For [`Target::Id`] the result is the patched record. For
    /// [`Target::All`] it is the list of every record that matched the filter
    /// before the patch, re-read after it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if a single target does not exist.
    #[instrument(skip_all, fields(service.id = %self.id(), target = %target))]
    pub async fn patch(
        &self,
        target: Target,
        data: Record,
        params: &Params,
    ) -> ServiceResult<OneOrMany<Record>> {
        let translated = translate(&params.query, &PaginationPolicy::disabled())?;
        let mut update = PatchUpdate::parse(&data, self.id());

        if let Some(validator) = &self.options.validators.patch {
            reject_invalid(collect_issues(validator.as_ref(), &update.fields(), ""))?;
        }

        let timestamps = &self.options.timestamps;
        if timestamps.enabled {
            update.set(timestamps.updated_field.clone(), now_timestamp());
        }

        let ids = self.resolve_ids(&target, params).await?;
        debug!(count = ids.len(), "resolved patch targets");

        if ids.is_empty() {
            return Ok(OneOrMany::Many(Vec::new()));
        }

        let update = update.into_document();
        if !update.is_empty() {
            let options = match target {
                Target::Id(_) => UpdateOptions::single(),
                Target::All => UpdateOptions::multi(),
            };
            let affected = self
                .options
                .model
                .update(&self.scope_to_ids(&ids), &update, options)
                .await?;
            debug!(affected, "patched records");
        }

        let requery = self.requery_params(ids, &translated);
        match target {
            Target::Id(id) => Ok(OneOrMany::One(self.get(&id, &requery).await?)),
            Target::All => Ok(OneOrMany::Many(self.find_all(&requery).await?)),
        }
    }

    /// Removes the record(s) identified by `target` and returns them as they
    /// were just before removal.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if a single target does not exist.
    #[instrument(skip_all, fields(service.id = %self.id(), target = %target))]
    pub async fn remove(&self, target: Target, params: &Params) -> ServiceResult<OneOrMany<Record>> {
        match target {
            Target::Id(id) => {
                let record = self.get(&id, params).await?;
                let removed = self
                    .options
                    .model
                    .remove(&self.scope_to_ids(&[id]), RemoveOptions::single())
                    .await?;
                debug!(removed, "removed record");

                Ok(OneOrMany::One(record))
            }
            Target::All => {
                let records = self.find_all(params).await?;
                let ids = records
                    .iter()
                    .filter_map(|record| record.get(self.id()).cloned())
                    .collect::<Vec<_>>();

                if !ids.is_empty() {
                    let removed = self
                        .options
                        .model
                        .remove(&self.scope_to_ids(&ids), RemoveOptions::multi())
                        .await?;
                    debug!(removed, "removed records");
                }

                Ok(OneOrMany::Many(records))
            }
        }
    }

    /// Runs the paged query behind `find`. The count query only runs when
    /// `policy` is active, and a limit of zero skips the row query.
    async fn query_page(
        &self,
        query: &Document,
        policy: &PaginationPolicy,
    ) -> ServiceResult<Page<Record>> {
        let translated = translate(query, policy)?;
        let model = &self.options.model;

        let total = if policy.is_active() {
            Some(model.count(&translated.predicate).await?)
        } else {
            None
        };

        let data = match translated.controls.limit {
            Some(0) => Vec::new(),
            _ => {
                let mut find = translated.find_query();
                find.projection = self.projection(&translated);
                model.find(find).await?
            }
        };

        Ok(Page::builder(
            data.into_iter()
                .map(|record| self.select(record, &translated))
                .collect::<Vec<_>>(),
        )
        .with_total(total.unwrap_or_default())
        .with_limit(translated.controls.limit.unwrap_or_default())
        .with_skip(translated.controls.skip.unwrap_or_default())
        .build())
    }

    async fn find_all(&self, params: &Params) -> ServiceResult<Vec<Record>> {
        Ok(self
            .query_page(&params.query, &PaginationPolicy::disabled())
            .await?
            .data)
    }

    /// Snapshots the identifiers a write will touch.
    async fn resolve_ids(&self, target: &Target, params: &Params) -> ServiceResult<Vec<Bson>> {
        match target {
            Target::Id(id) => {
                self.get(id, params).await?;
                Ok(vec![id.clone()])
            }
            Target::All => Ok(self
                .find_all(params)
                .await?
                .iter()
                .filter_map(|record| record.get(self.id()).cloned())
                .collect()),
        }
    }

    /// Parameters re-reading exactly `ids`, keeping the caller's `$select`.
    fn requery_params(&self, ids: Vec<Bson>, translated: &TranslatedFilter) -> Params {
        let mut query = self.scope_to_ids(&ids);

        if let Some(select) = &translated.controls.select {
            query.insert(SELECT_KEY, select.clone());
        }

        Params::query(query).without_pagination()
    }

    fn scope_to_id(&self, predicate: Document, id: &Bson) -> Document {
        let scoped = doc! { self.id(): id.clone() };

        if predicate.is_empty() {
            scoped
        } else {
            doc! { "$and": [predicate, scoped] }
        }
    }

    fn scope_to_ids(&self, ids: &[Bson]) -> Document {
        match ids {
            [id] => doc! { self.id(): id.clone() },
            _ => doc! { self.id(): { "$in": ids.to_vec() } },
        }
    }

    /// Store projection for a `$select`, widened to keep the identifier.
    fn projection(&self, translated: &TranslatedFilter) -> Option<Vec<String>> {
        translated.controls.select.as_ref().map(|fields| {
            let mut fields = fields.clone();
            if !fields.iter().any(|field| field == self.id()) {
                fields.push(self.id().to_string());
            }
            fields
        })
    }

    fn select(&self, record: Record, translated: &TranslatedFilter) -> Record {
        match &translated.controls.select {
            Some(fields) => select_fields(record, fields, self.id()),
            None => record,
        }
    }

    fn prepare_new(&self, record: Record) -> Record {
        let id_field = self.id();
        let mut record = if id_field != DEFAULT_ID_FIELD && !record.contains_key(id_field) {
            let mut with_id = doc! { id_field: generate_id() };
            for (key, value) in record {
                with_id.insert(key, value);
            }
            with_id
        } else {
            record
        };

        let timestamps = &self.options.timestamps;
        if timestamps.enabled {
            let now = now_timestamp();
            record.insert(timestamps.created_field.clone(), now.clone());
            record.insert(timestamps.updated_field.clone(), now);
        }

        record
    }
}

fn collect_issues(
    validator: &dyn RecordValidator,
    record: &Record,
    prefix: &str,
) -> Vec<ValidationIssue> {
    match validator.validate(record) {
        Ok(()) => Vec::new(),
        Err(issues) => issues
            .into_iter()
            .map(|issue| issue.prefixed(prefix))
            .collect(),
    }
}

fn reject_invalid(issues: Vec<ValidationIssue>) -> ServiceResult<()> {
    if issues.is_empty() {
        return Ok(());
    }

    let errors = ValidationErrors::new(issues);
    warn!(issues = errors.len(), "rejected invalid data: {}", errors);

    Err(errors.into())
}

#[async_trait]
impl<B: StoreBackend> CrudService for Service<B> {
    async fn find(&self, params: &Params) -> ServiceResult<FindResult> {
        Service::find(self, params).await
    }

    async fn get(&self, id: &Bson, params: &Params) -> ServiceResult<Record> {
        Service::get(self, id, params).await
    }

    async fn create(
        &self,
        data: OneOrMany<Record>,
        params: &Params,
    ) -> ServiceResult<OneOrMany<Record>> {
        Service::create(self, data, params).await
    }

    async fn update(
        &self,
        target: Target,
        data: OneOrMany<Record>,
        params: &Params,
    ) -> ServiceResult<Record> {
        Service::update(self, target, data, params).await
    }

    async fn patch(
        &self,
        target: Target,
        data: Record,
        params: &Params,
    ) -> ServiceResult<OneOrMany<Record>> {
        Service::patch(self, target, data, params).await
    }

    async fn remove(&self, target: Target, params: &Params) -> ServiceResult<OneOrMany<Record>> {
        Service::remove(self, target, params).await
    }
}
