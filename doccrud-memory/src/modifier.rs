//! Update document application.
//!
//! An update document either consists entirely of operators (`$set`,
//! `$inc`, ...) or is a whole replacement record. Mixing the two is rejected.

use bson::{Bson, Document};
use std::cmp::Ordering;

use doccrud_core::{
    error::{ServiceError, ServiceResult},
    record::{DEFAULT_ID_FIELD, get_path},
};

use crate::evaluator::{Comparable, matches_eq};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operator {
    Set,
    Unset,
    Inc,
    Push,
    AddToSet,
    Pull,
    Min,
    Max,
}

impl Operator {
    fn parse(name: &str) -> ServiceResult<Self> {
        match name {
            "$set" => Ok(Operator::Set),
            "$unset" => Ok(Operator::Unset),
            "$inc" => Ok(Operator::Inc),
            "$push" => Ok(Operator::Push),
            "$addToSet" => Ok(Operator::AddToSet),
            "$pull" => Ok(Operator::Pull),
            "$min" => Ok(Operator::Min),
            "$max" => Ok(Operator::Max),
            other => Err(ServiceError::BadRequest(format!("Unknown update operator {}", other))),
        }
    }
}

/// A parsed update document.
#[derive(Debug, Clone)]
pub(crate) enum Modification {
    Replace(Document),
    Operators(Vec<(Operator, Document)>),
}

impl Modification {
    pub fn parse(update: &Document) -> ServiceResult<Self> {
        let operators = update.keys().filter(|key| key.starts_with('$')).count();

        if operators == 0 {
            return Ok(Modification::Replace(update.clone()));
        }
        if operators != update.len() {
            return Err(ServiceError::BadRequest(
                "Cannot mix update operators and plain fields".to_string(),
            ));
        }

        update
            .iter()
            .map(|(name, fields)| match fields {
                Bson::Document(fields) => Ok((Operator::parse(name)?, fields.clone())),
                _ => Err(ServiceError::BadRequest(format!("{} expects a document", name))),
            })
            .collect::<ServiceResult<Vec<_>>>()
            .map(Modification::Operators)
    }

    /// Returns the updated copy of `original`. The store key never changes.
    pub fn apply(&self, original: &Document) -> ServiceResult<Document> {
        match self {
            Modification::Replace(replacement) => {
                let id = original.get(DEFAULT_ID_FIELD);

                if let (Some(new_id), Some(id)) = (replacement.get(DEFAULT_ID_FIELD), id) {
                    if new_id != id {
                        return Err(ServiceError::BadRequest("Cannot change a record's _id".to_string()));
                    }
                }

                let mut updated = Document::new();
                if let Some(id) = id {
                    updated.insert(DEFAULT_ID_FIELD, id.clone());
                }
                for (key, value) in replacement {
                    updated.insert(key.clone(), value.clone());
                }

                Ok(updated)
            }
            Modification::Operators(operators) => {
                let mut updated = original.clone();

                for (operator, fields) in operators {
                    for (path, operand) in fields {
                        if path == DEFAULT_ID_FIELD || path.starts_with("_id.") {
                            return Err(ServiceError::BadRequest("Cannot change a record's _id".to_string()));
                        }
                        apply_operator(&mut updated, *operator, path, operand)?;
                    }
                }

                Ok(updated)
            }
        }
    }

    /// Builds the record inserted by an upsert that matched nothing.
    ///
    /// Operator updates start from the predicate's plain equality clauses;
    /// replacements are inserted as given.
    pub fn upsert_record(&self, predicate: &Document) -> ServiceResult<Document> {
        match self {
            Modification::Replace(replacement) => Ok(replacement.clone()),
            Modification::Operators(_) => {
                let mut base = Document::new();

                for (key, value) in predicate {
                    let is_operator_clause = match value {
                        Bson::Document(doc) => doc.keys().any(|k| k.starts_with('$')),
                        _ => false,
                    };
                    if !key.starts_with('$') && !is_operator_clause {
                        set_path(&mut base, key, value.clone())?;
                    }
                }

                self.apply(&base)
            }
        }
    }
}

fn apply_operator(doc: &mut Document, operator: Operator, path: &str, operand: &Bson) -> ServiceResult<()> {
    match operator {
        Operator::Set => set_path(doc, path, operand.clone()),
        Operator::Unset => {
            unset_path(doc, path);
            Ok(())
        },
        Operator::Inc => {
            let sum = match (get_path(doc, path), operand) {
                (None, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => operand.clone(),
                // 32-bit sums widen to 64 bits; 64-bit overflow is an error.
                (Some(Bson::Int32(a)), Bson::Int32(b)) => match a.checked_add(*b) {
                    Some(sum) => Bson::Int32(sum),
                    None => Bson::Int64(i64::from(*a) + i64::from(*b)),
                },
                (Some(Bson::Int32(a)), Bson::Int64(b)) => checked_long_sum(path, i64::from(*a), *b)?,
                (Some(Bson::Int64(a)), Bson::Int32(b)) => checked_long_sum(path, *a, i64::from(*b))?,
                (Some(Bson::Int64(a)), Bson::Int64(b)) => checked_long_sum(path, *a, *b)?,
                (Some(current), _) => match (as_f64(current), as_f64(operand)) {
                    (Some(a), Some(b)) => Bson::Double(a + b),
                    _ => return Err(ServiceError::BadRequest(format!("Cannot $inc non-numeric field {}", path))),
                },
                (None, _) => return Err(ServiceError::BadRequest(format!("$inc on {} expects a number", path))),
            };

            set_path(doc, path, sum)
        },
        Operator::Push | Operator::AddToSet => {
            let values = match operand {
                Bson::Document(spec) if spec.contains_key("$each") => spec
                    .get_array("$each")
                    .map_err(|_| ServiceError::BadRequest("$each expects an array".to_string()))?
                    .clone(),
                single => vec![single.clone()],
            };
            let mut items = match get_path(doc, path) {
                Some(Bson::Array(items)) => items.clone(),
                None => Vec::new(),
                Some(_) => return Err(ServiceError::BadRequest(format!("Cannot push to non-array field {}", path))),
            };

            for value in values {
                let present = items
                    .iter()
                    .any(|item| Comparable::from(item) == Comparable::from(&value));
                if operator == Operator::Push || !present {
                    items.push(value);
                }
            }

            set_path(doc, path, Bson::Array(items))
        },
        Operator::Pull => {
            let kept = match get_path(doc, path) {
                Some(Bson::Array(items)) => items
                    .iter()
                    .filter(|item| !matches_eq(Some(*item), operand))
                    .cloned()
                    .collect::<Vec<_>>(),
                None => return Ok(()),
                Some(_) => return Err(ServiceError::BadRequest(format!("Cannot pull from non-array field {}", path))),
            };

            set_path(doc, path, Bson::Array(kept))
        },
        Operator::Min | Operator::Max => {
            let replace = match get_path(doc, path) {
                None => true,
                Some(current) => {
                    let ordering = Comparable::from(operand).sort_cmp(&Comparable::from(current));
                    match operator {
                        Operator::Min => ordering == Ordering::Less,
                        _ => ordering == Ordering::Greater,
                    }
                },
            };

            if replace {
                set_path(doc, path, operand.clone())?;
            }

            Ok(())
        },
    }
}

fn checked_long_sum(path: &str, a: i64, b: i64) -> ServiceResult<Bson> {
    a.checked_add(b)
        .map(Bson::Int64)
        .ok_or_else(|| ServiceError::BadRequest(format!("$inc overflows the integer at {}", path)))
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Sets a possibly dotted path, creating intermediate documents.
pub(crate) fn set_path(doc: &mut Document, path: &str, value: Bson) -> ServiceResult<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        },
        Some((head, rest)) => {
            if !doc.contains_key(head) {
                doc.insert(head, Document::new());
            }

            match doc.get_mut(head) {
                Some(Bson::Document(child)) => set_path(child, rest, value),
                _ => Err(ServiceError::BadRequest(format!("Cannot set {}: {} is not a document", path, head))),
            }
        },
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        },
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = doc.get_mut(head) {
                unset_path(child, rest);
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn apply(original: Document, update: Document) -> ServiceResult<Document> {
        Modification::parse(&update)?.apply(&original)
    }

    #[test]
    fn replacement_keeps_store_key() {
        let updated = apply(doc! { "_id": "k", "a": 1, "b": 2 }, doc! { "c": 3 }).unwrap();

        assert_eq!(updated, doc! { "_id": "k", "c": 3 });
    }

    #[test]
    fn set_unset_and_inc() {
        let updated = apply(
            doc! { "_id": "k", "n": 1, "old": true, "nested": { "x": 1 } },
            doc! {
                "$set": { "name": "Bo", "nested.y": 2, "fresh.z": 3 },
                "$unset": { "old": "" },
                "$inc": { "n": 2, "count": 1 },
            },
        )
        .unwrap();

        assert_eq!(
            updated,
            doc! {
                "_id": "k",
                "n": 3,
                "nested": { "x": 1, "y": 2 },
                "name": "Bo",
                "fresh": { "z": 3 },
                "count": 1,
            }
        );
    }

    #[test]
    fn array_operators() {
        let updated = apply(
            doc! { "_id": "k", "tags": ["a", "b"], "list": [1, 2, 1] },
            doc! {
                "$addToSet": { "tags": { "$each": ["b", "c"] } },
                "$push": { "log": "first" },
                "$pull": { "list": 1 },
            },
        )
        .unwrap();

        assert_eq!(updated.get_array("tags").unwrap(), &vec![Bson::from("a"), Bson::from("b"), Bson::from("c")]);
        assert_eq!(updated.get_array("log").unwrap(), &vec![Bson::from("first")]);
        assert_eq!(updated.get_array("list").unwrap(), &vec![Bson::Int32(2)]);
    }

    #[test]
    fn min_and_max() {
        let updated = apply(
            doc! { "_id": "k", "low": 5, "high": 5 },
            doc! { "$min": { "low": 3, "high": 9 }, "$max": { "high": 9, "fresh": 1 } },
        )
        .unwrap();

        assert_eq!(updated, doc! { "_id": "k", "low": 3, "high": 9, "fresh": 1 });
    }

    #[test]
    fn rejects_invalid_updates() {
        assert!(Modification::parse(&doc! { "$set": { "a": 1 }, "b": 2 }).is_err());
        assert!(Modification::parse(&doc! { "$rename": { "a": "b" } }).is_err());
        assert!(Modification::parse(&doc! { "$set": 1 }).is_err());
        assert!(apply(doc! { "_id": "k" }, doc! { "$set": { "_id": "j" } }).is_err());
        assert!(apply(doc! { "_id": "k" }, doc! { "_id": "j" }).is_err());
        assert!(apply(doc! { "_id": "k", "s": "x" }, doc! { "$inc": { "s": 1 } }).is_err());
        assert!(apply(doc! { "_id": "k", "s": "x" }, doc! { "$push": { "s": 1 } }).is_err());
    }

    #[test]
    fn inc_widens_ints_and_refuses_to_overflow_longs() {
        let updated = apply(
            doc! { "_id": "k", "n": i32::MAX, "m": 1_i64 },
            doc! { "$inc": { "n": 1, "m": 2 } },
        )
        .unwrap();
        assert_eq!(updated, doc! { "_id": "k", "n": i64::from(i32::MAX) + 1, "m": 3_i64 });

        let err = apply(doc! { "_id": "k", "n": i64::MAX }, doc! { "$inc": { "n": 1_i64 } }).unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(message) if message.contains("overflows")));

        assert!(apply(doc! { "_id": "k", "n": i64::MIN }, doc! { "$inc": { "n": -1 } }).is_err());
    }

    #[test]
    fn upsert_starts_from_equality_clauses() {
        let modification = Modification::parse(&doc! { "$set": { "b": 2 } }).unwrap();
        let record = modification
            .upsert_record(&doc! { "a": 1, "n": { "$gt": 0 }, "$or": [{ "x": 1 }] })
            .unwrap();

        assert_eq!(record, doc! { "a": 1, "b": 2 });
    }
}
