#![allow(dead_code)]

use bson::{Document, doc};
use doccrud::{memory::InMemoryStore, options::ServiceOptionsBuilder, prelude::*};
use serde_json::json;

pub fn people_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "minLength": 1 },
            "age": { "type": "integer", "minimum": 0 },
            "team": { "enum": ["red", "blue", "green"] }
        },
        "required": ["name"]
    })
}

pub fn builder() -> ServiceOptionsBuilder<InMemoryStore> {
    ServiceOptions::builder().model(InMemoryStore::new())
}

pub fn service(builder: ServiceOptionsBuilder<InMemoryStore>) -> Service<InMemoryStore> {
    Service::new(builder.build().unwrap())
}

pub fn people() -> Vec<Document> {
    vec![
        doc! { "name": "Ada", "age": 36, "team": "red" },
        doc! { "name": "Bo", "age": 25, "team": "blue" },
        doc! { "name": "Cy", "age": 41, "team": "red" },
        doc! { "name": "Di", "age": 19, "team": "green" },
        doc! { "name": "Ed", "age": 52, "team": "blue" },
    ]
}

/// Creates `records` and returns them as stored.
pub async fn seed(service: &Service<InMemoryStore>, records: Vec<Document>) -> Vec<Document> {
    service
        .create(records.into(), &Params::new())
        .await
        .unwrap()
        .into_vec()
}

pub fn names(records: &[Document]) -> Vec<&str> {
    records
        .iter()
        .map(|record| record.get_str("name").unwrap())
        .collect()
}
