mod common;

use std::sync::Arc;

use bson::doc;
use doccrud::{
    memory::InMemoryStore,
    options::{DEFAULT_CREATED_TIMESTAMP, DEFAULT_UPDATED_TIMESTAMP},
    prelude::*,
};
use serde_json::json;

use common::{builder, people, people_schema, seed, service};

#[derive(Debug)]
struct RejectEverything;

impl RecordValidator for RejectEverything {
    fn validate(&self, _record: &Record) -> Result<(), Vec<ValidationIssue>> {
        Err(vec![ValidationIssue::new("", "records are read-only")])
    }
}

#[test]
fn options_require_a_model() {
    let err = ServiceOptions::<InMemoryStore>::builder().build().unwrap_err();

    assert!(matches!(&err, ServiceError::Configuration(message) if message == "You must provide a Model"));
}

#[test]
fn options_reject_invalid_configuration() {
    assert!(matches!(builder().id("").build(), Err(ServiceError::Configuration(_))));

    let err = builder()
        .timestamps(true)
        .created_timestamp("")
        .build()
        .unwrap_err();
    assert!(matches!(err, ServiceError::Configuration(_)));

    let err = builder()
        .schema(people_schema())
        .validators(Arc::new(RejectEverything), Arc::new(RejectEverything))
        .build()
        .unwrap_err();
    assert!(matches!(err, ServiceError::Configuration(_)));

    let err = builder()
        .schema(json!({ "type": "whatever" }))
        .build()
        .unwrap_err();
    assert!(matches!(err, ServiceError::Configuration(_)));
}

#[test]
fn options_expose_their_defaults() {
    let options = builder()
        .timestamps(true)
        .events(vec!["created".to_string()])
        .build()
        .unwrap();

    assert_eq!(options.id(), "_id");
    assert!(!options.paginate().is_active());
    assert_eq!(options.timestamps().created_field, DEFAULT_CREATED_TIMESTAMP);
    assert_eq!(options.timestamps().updated_field, DEFAULT_UPDATED_TIMESTAMP);
    assert!(options.validators().create.is_none());
    assert_eq!(options.events(), ["created".to_string()]);
}

#[tokio::test]
async fn custom_timestamp_fields_are_stamped() {
    let notes = service(
        builder()
            .timestamps(true)
            .created_timestamp("created_on")
            .updated_timestamp("changed_on"),
    );

    let created = notes
        .create(doc! { "text": "hi" }.into(), &Params::new())
        .await
        .unwrap()
        .into_one()
        .unwrap();

    assert!(created.contains_key("created_on"));
    assert!(created.contains_key("changed_on"));
    assert!(!created.contains_key(DEFAULT_CREATED_TIMESTAMP));
}

#[tokio::test]
async fn custom_validators_guard_every_write() {
    let locked = service(builder().validators(Arc::new(RejectEverything), Arc::new(RejectEverything)));

    let err = locked
        .create(doc! { "name": "Ada" }.into(), &Params::new())
        .await
        .unwrap_err();

    match err {
        ServiceError::Validation(errors) => {
            assert_eq!(errors.to_string(), "records are read-only");
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn store_conflicts_are_surfaced() {
    let model = InMemoryStore::builder()
        .unique_field("name")
        .build()
        .await
        .unwrap();
    let people_service = Service::new(ServiceOptions::builder().model(model).build().unwrap());
    seed(&people_service, people()).await;

    let err = people_service
        .create(doc! { "name": "Ada" }.into(), &Params::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn services_share_a_model_and_work_through_the_trait() {
    let model = Arc::new(InMemoryStore::new());
    let writer = service(ServiceOptions::builder().shared_model(model.clone()));
    let reader: Arc<dyn CrudService> = Arc::new(service(
        ServiceOptions::builder()
            .shared_model(model)
            .paginate(PaginationPolicy::new(2, 10)),
    ));

    seed(&writer, people()).await;

    let result = reader.find(&Params::new()).await.unwrap();
    let page = result.page().unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.data.len(), 2);
}

#[tokio::test]
async fn schema_formats_patterns_and_combinators_are_enforced() {
    let contacts = service(builder().schema(json!({
        "type": "object",
        "properties": {
            "email": { "type": "string", "format": "email", "pattern": "@" },
            "tags": { "type": "array", "minItems": 1 },
            "kind": { "anyOf": [{ "const": "a" }, { "const": "b" }] }
        }
    })));

    let err = contacts
        .create(doc! { "email": "not-an-email", "tags": [], "kind": "zzz" }.into(), &Params::new())
        .await
        .unwrap_err();
    match err {
        ServiceError::Validation(errors) => {
            let mut paths = errors.iter().map(|issue| issue.path.as_str()).collect::<Vec<_>>();
            paths.sort();
            assert_eq!(paths, vec!["/email", "/email", "/kind", "/tags"]);
        },
        other => panic!("unexpected error: {other:?}"),
    }

    let stored = contacts.find(&Params::new()).await.unwrap();
    assert!(stored.data().is_empty());

    contacts
        .create(doc! { "email": "ada@example.com", "tags": ["x"], "kind": "b" }.into(), &Params::new())
        .await
        .unwrap();
}
