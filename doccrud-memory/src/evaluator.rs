//! Predicate evaluation for in-memory record filtering.
//!
//! This module provides the evaluation engine for parsed predicates,
//! enabling filtering, comparison and sort ordering on BSON records.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime};

use doccrud_core::{
    error::{ServiceError, ServiceResult},
    query::{Expr, FieldOp, QueryVisitor},
    record::get_path,
};


/// Type-erased, comparable representation of BSON values.
///
/// This enum wraps BSON values and provides comparison operations for
/// filtering queries. Integers compare exactly with each other and with
/// doubles, so 64-bit values beyond 2^53 stay distinct.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32- and 64-bit integers
    Integer(i64),
    /// Floating point value
    Number(f64),
    /// DateTime value
    DateTime(DateTime),
    /// String value
    String(&'a str),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other BSON value, compared by plain equality
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Integer(i64::from(*value)),
            Bson::Int64(value) => Comparable::Integer(*value),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Integer(_) | Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Other(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting: values of different types order by
    /// type, incomparable values of the same type are considered equal.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal))
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Integer(a), Comparable::Integer(b)) => a == b,
            (Comparable::Integer(a), Comparable::Number(b)) | (Comparable::Number(b), Comparable::Integer(a)) => {
                cmp_integer_to_float(*a, *b) == Some(Ordering::Equal)
            },
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Integer(a), Comparable::Integer(b)) => a.partial_cmp(b),
            (Comparable::Integer(a), Comparable::Number(b)) => cmp_integer_to_float(*a, *b),
            (Comparable::Number(a), Comparable::Integer(b)) => cmp_integer_to_float(*b, *a).map(Ordering::reverse),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Orders an integer against a double without rounding the integer.
fn cmp_integer_to_float(integer: i64, float: f64) -> Option<Ordering> {
    if float.is_nan() {
        return None;
    }
    // 2^63 is exactly representable; every i64 is below it.
    if float >= 9_223_372_036_854_775_808.0 {
        return Some(Ordering::Less);
    }
    if float < -9_223_372_036_854_775_808.0 {
        return Some(Ordering::Greater);
    }

    let whole = float.trunc();
    match integer.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(float - whole)),
        unequal => Some(unequal),
    }
}

/// Compares two possibly missing field values for sorting. Missing sorts as null.
pub(crate) fn compare_values(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let left = left.map(Comparable::from).unwrap_or(Comparable::Null);
    let right = right.map(Comparable::from).unwrap_or(Comparable::Null);

    left.sort_cmp(&right)
}

/// Equality as used by predicates: an array field matches a scalar when any
/// element matches, and a missing field matches only null.
pub(crate) fn matches_eq(found: Option<&Bson>, value: &Bson) -> bool {
    let expected = Comparable::from(value);

    match found {
        None => expected == Comparable::Null,
        Some(Bson::Array(items)) if !matches!(value, Bson::Array(_)) => items
            .iter()
            .any(|item| Comparable::from(item) == expected),
        Some(found) => Comparable::from(found) == expected,
    }
}


pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> ServiceResult<bool> {
        self.visit_expr(expr)
    }

    pub fn matches(document: &'a Document, expr: &Expr) -> ServiceResult<bool> {
        DocumentEvaluator::new(document).evaluate(expr)
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = ServiceError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(get_path(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let found = get_path(self.document, field);

        match op {
            FieldOp::Eq => Ok(matches_eq(found, value)),
            FieldOp::Ne => Ok(!matches_eq(found, value)),
            FieldOp::In | FieldOp::Nin => {
                let candidates = value.as_array().ok_or_else(|| {
                    ServiceError::BadRequest(format!("$in/$nin on {} expects an array", field))
                })?;
                let any = candidates
                    .iter()
                    .any(|candidate| matches_eq(found, candidate));

                Ok(if *op == FieldOp::In { any } else { !any })
            },
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                let expected = Comparable::from(value);
                let satisfies = |item: &Bson| match Comparable::from(item).partial_cmp(&expected) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        FieldOp::Lte => ordering != Ordering::Greater,
                        _ => false,
                    },
                    None => false,
                };

                Ok(match found {
                    Some(Bson::Array(items)) => items.iter().any(satisfies),
                    Some(item) => satisfies(item),
                    None => false,
                })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn eval(document: &Document, predicate: Document) -> bool {
        DocumentEvaluator::matches(document, &Expr::from_predicate(&predicate).unwrap()).unwrap()
    }

    #[test]
    fn equality_normalizes_numbers_and_walks_paths() {
        let record = doc! { "n": 3_i64, "address": { "city": "Oslo" } };

        assert!(eval(&record, doc! { "n": 3 }));
        assert!(eval(&record, doc! { "n": 3.0 }));
        assert!(eval(&record, doc! { "address.city": "Oslo" }));
        assert!(!eval(&record, doc! { "address.city": "Bergen" }));
    }

    #[test]
    fn large_integers_compare_exactly() {
        let big = 1_i64 << 53;
        let record = doc! { "n": big + 1 };

        assert!(!eval(&record, doc! { "n": big }));
        assert!(eval(&record, doc! { "n": big + 1 }));
        assert!(!eval(&record, doc! { "n": { "$in": [big] } }));
        assert!(eval(&record, doc! { "n": { "$in": [big, big + 1] } }));
        assert!(eval(&record, doc! { "n": { "$gt": big } }));
        assert!(!eval(&record, doc! { "n": (big + 1) as f64 }));
        assert!(eval(&record, doc! { "n": { "$gt": 0.5 } }));
        assert_eq!(
            compare_values(Some(&Bson::Int64(big)), Some(&Bson::Int64(big + 1))),
            Ordering::Less
        );
    }

    #[test]
    fn scalar_equality_matches_array_elements() {
        let record = doc! { "tags": ["red", "blue"] };

        assert!(eval(&record, doc! { "tags": "red" }));
        assert!(eval(&record, doc! { "tags": ["red", "blue"] }));
        assert!(!eval(&record, doc! { "tags": "green" }));
        assert!(eval(&record, doc! { "tags": { "$in": ["green", "blue"] } }));
        assert!(eval(&record, doc! { "tags": { "$nin": ["green"] } }));
    }

    #[test]
    fn comparisons_require_comparable_types() {
        let record = doc! { "age": 30, "name": "Mia" };

        assert!(eval(&record, doc! { "age": { "$gt": 18, "$lte": 30 } }));
        assert!(!eval(&record, doc! { "age": { "$lt": 30 } }));
        assert!(!eval(&record, doc! { "age": { "$gt": "10" } }));
        assert!(eval(&record, doc! { "name": { "$gte": "M" } }));
        assert!(!eval(&record, doc! { "missing": { "$gt": 0 } }));
    }

    #[test]
    fn missing_fields_equal_null_only() {
        let record = doc! { "a": 1 };

        assert!(eval(&record, doc! { "b": null }));
        assert!(eval(&record, doc! { "b": { "$ne": 1 } }));
        assert!(eval(&record, doc! { "b": { "$exists": false } }));
        assert!(!eval(&record, doc! { "a": { "$exists": false } }));
    }

    #[test]
    fn logical_operators_combine() {
        let record = doc! { "a": 1, "b": 2 };

        assert!(eval(&record, doc! { "$or": [{ "a": 5 }, { "b": 2 }] }));
        assert!(!eval(&record, doc! { "$and": [{ "a": 1 }, { "b": 3 }] }));
        assert!(eval(&record, doc! { "$nor": [{ "a": 5 }] }));
        assert!(eval(&record, doc! { "a": { "$not": { "$gt": 3 } } }));
    }

    #[test]
    fn sort_order_groups_by_type() {
        let null = Bson::Null;
        let number = Bson::Int32(5);
        let string = Bson::String("a".into());

        assert_eq!(compare_values(None, Some(&number)), Ordering::Less);
        assert_eq!(compare_values(Some(&null), None), Ordering::Equal);
        assert_eq!(compare_values(Some(&number), Some(&string)), Ordering::Less);
        assert_eq!(compare_values(Some(&Bson::Double(7.5)), Some(&number)), Ordering::Greater);
    }
}
