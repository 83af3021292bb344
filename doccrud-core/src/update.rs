//! Patch payload parsing.
//!
//! A patch payload mixes plain fields, which become field-level `$set`
//! operations, with `$`-prefixed keys, which are store-native update
//! operators passed through verbatim. The payload is parsed once per call
//! into [`UpdateClause`]s and rendered into a single store update document.

use bson::{Bson, Document};

use crate::record::DEFAULT_ID_FIELD;

const SET_OPERATOR: &str = "$set";

/// One part of a patch.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateClause {
    /// Plain fields to set to the given values.
    FieldSet(Document),
    /// A store-native update operator and its payload, e.g. `$inc`.
    RawDirective { operator: String, payload: Bson },
}

/// A parsed patch payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchUpdate {
    clauses: Vec<UpdateClause>,
    id_field: String,
}

impl PatchUpdate {
    /// Parses `data`, dropping any attempt to set the identifier field or
    /// the store key.
    pub fn parse(data: &Document, id_field: &str) -> Self {
        let mut fields = Document::new();
        let mut clauses = Vec::new();

        for (key, value) in data {
            if key.starts_with('$') {
                clauses.push(UpdateClause::RawDirective {
                    operator: key.clone(),
                    payload: value.clone(),
                });
            } else if key != DEFAULT_ID_FIELD && key != id_field {
                fields.insert(key.clone(), value.clone());
            }
        }
        clauses.insert(0, UpdateClause::FieldSet(fields));

        Self {
            clauses,
            id_field: id_field.to_string(),
        }
    }

    pub fn clauses(&self) -> &[UpdateClause] {
        &self.clauses
    }

    /// Every field the patch sets, from plain fields and from explicit
    /// `$set` directives alike; this is what gets validated.
    ///
    /// Merged the same way as in [`into_document`](Self::into_document), so
    /// the validated values are exactly the values written.
    pub fn fields(&self) -> Document {
        let mut merged = Document::new();

        for clause in &self.clauses {
            match clause {
                UpdateClause::FieldSet(fields) => merge_into(&mut merged, fields.clone()),
                UpdateClause::RawDirective { operator, payload: Bson::Document(fields) }
                    if operator == SET_OPERATOR =>
                {
                    merge_into(&mut merged, fields.clone());
                }
                UpdateClause::RawDirective { .. } => {}
            }
        }

        merged.remove(DEFAULT_ID_FIELD);
        merged.remove(&self.id_field);

        merged
    }

    /// Adds a derived field (such as a timestamp) to the field set.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        let (key, value) = (key.into(), value.into());

        let position = self
            .clauses
            .iter()
            .position(|clause| matches!(clause, UpdateClause::FieldSet(_)));

        match position.map(|index| &mut self.clauses[index]) {
            Some(UpdateClause::FieldSet(fields)) => {
                fields.insert(key, value);
            }
            _ => {
                let mut fields = Document::new();
                fields.insert(key, value);
                self.clauses.insert(0, UpdateClause::FieldSet(fields));
            }
        }
    }

    /// Renders the store update document.
    ///
    /// Plain fields and any explicit `$set` directive are merged into one
    /// `$set`, with the explicit directive winning on conflicts. Identifier
    /// keys are removed from every operator payload.
    pub fn into_document(self) -> Document {
        let mut set = Document::new();
        let mut update = Document::new();

        for clause in self.clauses {
            match clause {
                UpdateClause::FieldSet(fields) => merge_into(&mut set, fields),
                UpdateClause::RawDirective { operator, payload } if operator == SET_OPERATOR => {
                    match payload {
                        Bson::Document(fields) => merge_into(&mut set, fields),
                        other => {
                            update.insert(operator, other);
                        }
                    }
                }
                UpdateClause::RawDirective { operator, payload } => {
                    update.insert(operator, strip_ids(payload, &self.id_field));
                }
            }
        }

        if let Bson::Document(set) = strip_ids(Bson::Document(set), &self.id_field) {
            if !set.is_empty() {
                update.insert(SET_OPERATOR, set);
            }
        }

        update
    }
}

fn merge_into(target: &mut Document, fields: Document) {
    for (key, value) in fields {
        target.insert(key, value);
    }
}

fn strip_ids(payload: Bson, id_field: &str) -> Bson {
    match payload {
        Bson::Document(mut doc) => {
            doc.remove(DEFAULT_ID_FIELD);
            doc.remove(id_field);
            Bson::Document(doc)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn splits_fields_from_raw_directives() {
        let patch = PatchUpdate::parse(&doc! { "name": "Bo", "$inc": { "visits": 1 } }, "_id");

        assert_eq!(
            patch.clauses(),
            &[
                UpdateClause::FieldSet(doc! { "name": "Bo" }),
                UpdateClause::RawDirective {
                    operator: "$inc".into(),
                    payload: Bson::Document(doc! { "visits": 1 }),
                },
            ]
        );
        assert_eq!(
            patch.into_document(),
            doc! { "$inc": { "visits": 1 }, "$set": { "name": "Bo" } }
        );
    }

    #[test]
    fn identifier_fields_are_never_set() {
        let data = doc! {
            "_id": "x",
            "uuid": "y",
            "name": "Bo",
            "$set": { "uuid": "z", "age": 3 },
            "$inc": { "uuid": 1, "n": 1 },
        };

        let update = PatchUpdate::parse(&data, "uuid").into_document();

        assert_eq!(update, doc! { "$inc": { "n": 1 }, "$set": { "name": "Bo", "age": 3 } });
    }

    #[test]
    fn empty_field_set_renders_no_set() {
        let update = PatchUpdate::parse(&doc! { "$unset": { "old": true } }, "_id").into_document();

        assert_eq!(update, doc! { "$unset": { "old": true } });
    }

    #[test]
    fn derived_fields_join_the_field_set() {
        let mut patch = PatchUpdate::parse(&doc! { "name": "Bo" }, "_id");
        patch.set("updatedAt", "2024-01-01T00:00:00.000Z");

        assert_eq!(patch.fields(), doc! { "name": "Bo", "updatedAt": "2024-01-01T00:00:00.000Z" });
    }

    #[test]
    fn explicit_set_payloads_are_part_of_the_fields() {
        let patch = PatchUpdate::parse(
            &doc! {
                "name": "Bo",
                "$set": { "name": "Cy", "age": "old", "uuid": "z" },
                "$inc": { "visits": 1 },
            },
            "uuid",
        );

        assert_eq!(patch.fields(), doc! { "name": "Cy", "age": "old" });
    }
}
