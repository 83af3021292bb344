//! Store-side query representation.
//!
//! The service engine treats predicates as opaque documents and passes them
//! to the store verbatim. Backends that evaluate predicates themselves can
//! parse them into the [`Expr`] tree defined here and walk it with a
//! [`QueryVisitor`].
//!
//! # Predicate Language
//!
//! Predicates follow the familiar document-store syntax:
//!
//! ```ignore
//! use bson::doc;
//!
//! let predicate = doc! {
//!     "status": "active",
//!     "age": { "$gte": 18, "$lt": 65 },
//!     "$or": [{ "role": "admin" }, { "tags": { "$in": ["staff"] } }],
//! };
//! let expr = Expr::from_predicate(&predicate)?;
//! ```
//!
//! - Comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`
//! - Membership: `$in`, `$nin`
//! - Existence: `$exists`
//! - Logical: `$and`, `$or`, `$nor`, and field-level `$not`

use bson::{Bson, Document};

use crate::error::{ServiceError, ServiceResult};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field name (or dotted path) to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to. Matches array fields containing the value.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Equal to any of the listed values.
    In,
    /// Equal to none of the listed values.
    Nin,
}

impl FieldOp {
    fn from_operator(operator: &str) -> Option<Self> {
        match operator {
            "$eq" => Some(FieldOp::Eq),
            "$ne" => Some(FieldOp::Ne),
            "$gt" => Some(FieldOp::Gt),
            "$gte" => Some(FieldOp::Gte),
            "$lt" => Some(FieldOp::Lt),
            "$lte" => Some(FieldOp::Lte),
            "$in" => Some(FieldOp::In),
            "$nin" => Some(FieldOp::Nin),
            _ => None,
        }
    }
}

/// A parsed predicate expression.
///
/// An empty `And` matches every record.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name (or dotted path) to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: impl Into<String>, op: FieldOp, value: Bson) -> Self {
        Expr::Field {
            field: field.into(),
            op,
            value,
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Parses a predicate document into an expression tree.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::BadRequest`] for unknown operators, operator
    /// documents mixed with plain fields, and malformed operands.
    pub fn from_predicate(predicate: &Document) -> ServiceResult<Expr> {
        let mut clauses = Vec::with_capacity(predicate.len());

        for (key, value) in predicate {
            match key.as_str() {
                "$and" => clauses.push(Expr::And(Self::parse_list(key, value)?)),
                "$or" => clauses.push(Expr::Or(Self::parse_list(key, value)?)),
                "$nor" => clauses.push(Expr::Or(Self::parse_list(key, value)?).not()),
                operator if operator.starts_with('$') => {
                    return Err(ServiceError::BadRequest(format!(
                        "Unknown logical operator {}",
                        operator
                    )));
                }
                field => clauses.extend(Self::parse_field(field, value)?),
            }
        }

        Ok(match clauses.len() {
            1 => clauses.remove(0),
            _ => Expr::And(clauses),
        })
    }

    fn parse_list(operator: &str, value: &Bson) -> ServiceResult<Vec<Expr>> {
        value
            .as_array()
            .ok_or_else(|| {
                ServiceError::BadRequest(format!("{} expects an array of predicates", operator))
            })?
            .iter()
            .map(|item| match item {
                Bson::Document(doc) => Self::from_predicate(doc),
                _ => Err(ServiceError::BadRequest(format!(
                    "{} expects an array of predicates",
                    operator
                ))),
            })
            .collect()
    }

    fn parse_field(field: &str, value: &Bson) -> ServiceResult<Vec<Expr>> {
        let operators = match value {
            Bson::Document(doc) if is_operator_document(doc)? => doc,
            _ => return Ok(vec![Expr::field(field, FieldOp::Eq, value.clone())]),
        };

        operators
            .iter()
            .map(|(operator, operand)| match operator.as_str() {
                "$exists" => Ok(Expr::Exists(field.to_string(), is_truthy(operand))),
                "$not" => Ok(Expr::And(Self::parse_field(field, operand)?).not()),
                "$in" | "$nin" if operand.as_array().is_none() => Err(ServiceError::BadRequest(
                    format!("{} on {} expects an array", operator, field),
                )),
                _ => FieldOp::from_operator(operator)
                    .map(|op| Expr::field(field, op, operand.clone()))
                    .ok_or_else(|| {
                        ServiceError::BadRequest(format!(
                            "Unknown comparison operator {}",
                            operator
                        ))
                    }),
            })
            .collect()
    }
}

/// Returns `true` if every key is an operator, `false` if none is.
fn is_operator_document(doc: &Document) -> ServiceResult<bool> {
    let operators = doc.keys().filter(|key| key.starts_with('$')).count();

    match operators {
        0 => Ok(false),
        n if n == doc.len() => Ok(true),
        _ => Err(ServiceError::BadRequest(
            "Cannot mix operators and plain fields in one clause".to_string(),
        )),
    }
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// A store-native find request: a predicate plus cursor directives.
///
/// Directives are applied in the order sort, skip, limit. Use
/// [`FindQueryBuilder`] for ergonomic construction.
///
/// # Example
///
/// ```ignore
/// let query = FindQuery::builder(doc! { "status": "active" })
///     .sort("created_at", SortDirection::Desc)
///     .skip(20)
///     .limit(10)
///     .build();
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    /// Predicate matched against every record.
    pub predicate: Document,
    /// Sort keys, most significant first.
    pub sort: Vec<Sort>,
    /// Number of records to skip.
    pub skip: Option<usize>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Fields to return. The store keeps its own key (`_id`) as well.
    pub projection: Option<Vec<String>>,
}

impl FindQuery {
    /// Creates a query matching `predicate` with no directives.
    pub fn new(predicate: Document) -> Self {
        Self {
            predicate,
            ..Default::default()
        }
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder(predicate: Document) -> FindQueryBuilder {
        FindQueryBuilder::new(predicate)
    }
}

#[derive(Debug, Clone)]
pub struct FindQueryBuilder {
    query: FindQuery,
}

impl FindQueryBuilder {
    pub fn new(predicate: Document) -> Self {
        FindQueryBuilder {
            query: FindQuery::new(predicate),
        }
    }

    /// Appends a sort key. Earlier keys take precedence.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort::new(field, direction));
        self
    }

    /// Replaces all sort keys.
    pub fn sorts(mut self, sort: Vec<Sort>) -> Self {
        self.query.sort = sort;
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.query.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn projection(mut self, fields: Vec<String>) -> Self {
        self.query.projection = Some(fields);
        self
    }

    pub fn build(self) -> FindQuery {
        self.query
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<ServiceError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn plain_values_become_equality() {
        let expr = Expr::from_predicate(&doc! { "name": "Alice" }).unwrap();

        assert_eq!(expr, Expr::field("name", FieldOp::Eq, Bson::String("Alice".into())));
    }

    #[test]
    fn operator_documents_expand_per_operator() {
        let expr = Expr::from_predicate(&doc! { "age": { "$gte": 18, "$lt": 65 } }).unwrap();

        assert_eq!(
            expr,
            Expr::And(vec![
                Expr::field("age", FieldOp::Gte, Bson::Int32(18)),
                Expr::field("age", FieldOp::Lt, Bson::Int32(65)),
            ])
        );
    }

    #[test]
    fn nested_documents_without_operators_are_equality() {
        let expr = Expr::from_predicate(&doc! { "address": { "city": "Oslo" } }).unwrap();

        assert_eq!(
            expr,
            Expr::field("address", FieldOp::Eq, Bson::Document(doc! { "city": "Oslo" }))
        );
    }

    #[test]
    fn logical_operators_parse_recursively() {
        let expr = Expr::from_predicate(&doc! {
            "$or": [{ "a": 1 }, { "b": { "$exists": true } }],
            "$nor": [{ "c": 2 }],
        })
        .unwrap();

        assert_eq!(
            expr,
            Expr::And(vec![
                Expr::Or(vec![
                    Expr::field("a", FieldOp::Eq, Bson::Int32(1)),
                    Expr::Exists("b".into(), true),
                ]),
                Expr::Or(vec![Expr::field("c", FieldOp::Eq, Bson::Int32(2))]).not(),
            ])
        );
    }

    #[test]
    fn rejects_unknown_and_malformed_operators() {
        assert!(Expr::from_predicate(&doc! { "a": { "$near": 1 } }).is_err());
        assert!(Expr::from_predicate(&doc! { "$where": "1" }).is_err());
        assert!(Expr::from_predicate(&doc! { "a": { "$in": 1 } }).is_err());
        assert!(Expr::from_predicate(&doc! { "a": { "$gt": 1, "b": 2 } }).is_err());
        assert!(Expr::from_predicate(&doc! { "$or": { "a": 1 } }).is_err());
    }

    #[test]
    fn empty_predicate_matches_everything() {
        assert_eq!(Expr::from_predicate(&doc! {}).unwrap(), Expr::And(vec![]));
    }
}
