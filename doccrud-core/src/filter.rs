//! Filter translation.
//!
//! A caller's filter is a single document mixing *control directives*
//! (`$sort`, `$limit`, `$skip`, `$select`) with *predicate* clauses. The
//! translator partitions the two: directives are parsed into
//! [`FilterControls`], and every other key is copied to the predicate
//! untouched, so comparison operators pass through without the translator
//! understanding them.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use doccrud::{filter::translate, page::PaginationPolicy};
//!
//! let filter = doc! { "age": { "$gt": 18 }, "$sort": { "name": 1 }, "$limit": 5 };
//! let translated = translate(&filter, &PaginationPolicy::disabled())?;
//!
//! assert_eq!(translated.predicate, doc! { "age": { "$gt": 18 } });
//! assert_eq!(translated.controls.limit, Some(5));
//! ```

use bson::{Bson, Document};

use crate::{
    error::{ServiceResult, ValidationErrors, ValidationIssue},
    page::PaginationPolicy,
    query::{FindQuery, Sort, SortDirection},
};

pub const SORT_KEY: &str = "$sort";
pub const LIMIT_KEY: &str = "$limit";
pub const SKIP_KEY: &str = "$skip";
pub const SELECT_KEY: &str = "$select";

/// Every reserved directive name.
pub const CONTROL_KEYS: [&str; 4] = [SORT_KEY, LIMIT_KEY, SKIP_KEY, SELECT_KEY];

/// Returns `true` if `key` names a control directive.
pub fn is_control_key(key: &str) -> bool {
    CONTROL_KEYS.contains(&key)
}

/// Parsed paging, sorting and projection directives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterControls {
    /// Sort keys in the order they were given.
    pub sort: Vec<Sort>,
    /// Page size after the pagination policy was applied. `Some(0)` asks for
    /// the total count only.
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    /// Fields to return; the identifier field is always added on output.
    pub select: Option<Vec<String>>,
}

/// The result of translating a filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslatedFilter {
    /// Every non-directive key of the filter, verbatim.
    pub predicate: Document,
    pub controls: FilterControls,
}

impl TranslatedFilter {
    /// Builds the store query for the rows of this filter.
    pub fn find_query(&self) -> FindQuery {
        FindQuery {
            predicate: self.predicate.clone(),
            sort: self.controls.sort.clone(),
            skip: self.controls.skip,
            limit: self.controls.limit,
            projection: self.controls.select.clone(),
        }
    }
}

/// Splits `filter` into a predicate and control directives.
///
/// `policy` rewrites the limit: when pagination is active an absent limit
/// becomes the default page size and any limit is clipped to the maximum.
///
/// # Errors
///
/// Returns [`ServiceError::Validation`](crate::error::ServiceError::Validation)
/// listing every malformed directive value. Translation never fails otherwise.
pub fn translate(filter: &Document, policy: &PaginationPolicy) -> ServiceResult<TranslatedFilter> {
    let mut translated = TranslatedFilter::default();
    let mut issues = Vec::new();
    let mut requested_limit = None;

    for (key, value) in filter {
        let parsed = match key.as_str() {
            SORT_KEY => parse_sort(value).map(|sort| translated.controls.sort = sort),
            LIMIT_KEY => parse_count(LIMIT_KEY, value).map(|limit| requested_limit = Some(limit)),
            SKIP_KEY => parse_count(SKIP_KEY, value).map(|skip| translated.controls.skip = Some(skip)),
            SELECT_KEY => parse_select(value).map(|select| translated.controls.select = Some(select)),
            _ => {
                translated.predicate.insert(key.clone(), value.clone());
                Ok(())
            }
        };

        if let Err(issue) = parsed {
            issues.push(issue);
        }
    }

    if !issues.is_empty() {
        return Err(ValidationErrors::new(issues).into());
    }

    translated.controls.limit = policy.effective_limit(requested_limit);

    Ok(translated)
}

fn parse_sort(value: &Bson) -> Result<Vec<Sort>, ValidationIssue> {
    let spec = value
        .as_document()
        .ok_or_else(|| ValidationIssue::new(SORT_KEY, "must be a document of field directions"))?;

    spec.iter()
        .map(|(field, direction)| {
            parse_direction(direction)
                .map(|direction| Sort::new(field.clone(), direction))
                .ok_or_else(|| {
                    ValidationIssue::new(
                        format!("{}.{}", SORT_KEY, field),
                        "direction must be 1, -1, \"asc\" or \"desc\"",
                    )
                })
        })
        .collect()
}

fn parse_direction(value: &Bson) -> Option<SortDirection> {
    let signum = match value {
        Bson::Int32(n) => *n as f64,
        Bson::Int64(n) => *n as f64,
        Bson::Double(n) => *n,
        Bson::String(s) => match s.to_ascii_lowercase().as_str() {
            "1" | "asc" | "ascending" => 1.0,
            "-1" | "desc" | "descending" => -1.0,
            _ => return None,
        },
        _ => return None,
    };

    if signum > 0.0 {
        Some(SortDirection::Asc)
    } else if signum < 0.0 {
        Some(SortDirection::Desc)
    } else {
        None
    }
}

fn parse_count(key: &str, value: &Bson) -> Result<usize, ValidationIssue> {
    let count = match value {
        Bson::Int32(n) if *n >= 0 => Some(*n as usize),
        Bson::Int64(n) if *n >= 0 => Some(*n as usize),
        Bson::Double(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
        Bson::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    };

    count.ok_or_else(|| ValidationIssue::new(key, "must be a non-negative integer"))
}

fn parse_select(value: &Bson) -> Result<Vec<String>, ValidationIssue> {
    let invalid = || ValidationIssue::new(SELECT_KEY, "must be an array of field names");

    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|field| field.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use bson::doc;

    #[test]
    fn partitions_directives_from_predicate() {
        let filter = doc! {
            "name": "Alice",
            "age": { "$gte": 21 },
            "$sort": { "age": -1, "name": 1 },
            "$skip": 2,
            "$limit": 3,
            "$select": ["name"],
        };

        let translated = translate(&filter, &PaginationPolicy::disabled()).unwrap();

        assert_eq!(translated.predicate, doc! { "name": "Alice", "age": { "$gte": 21 } });
        assert_eq!(
            translated.controls.sort,
            vec![Sort::new("age", SortDirection::Desc), Sort::new("name", SortDirection::Asc)]
        );
        assert_eq!(translated.controls.skip, Some(2));
        assert_eq!(translated.controls.limit, Some(3));
        assert_eq!(translated.controls.select, Some(vec!["name".to_string()]));
    }

    #[test]
    fn unknown_dollar_keys_stay_in_predicate() {
        let filter = doc! { "$or": [{ "a": 1 }, { "b": 2 }] };
        let translated = translate(&filter, &PaginationPolicy::disabled()).unwrap();

        assert_eq!(translated.predicate, filter);
        assert_eq!(translated.controls, FilterControls::default());
    }

    #[test]
    fn policy_supplies_and_clips_limit() {
        let policy = PaginationPolicy::new(5, 10);

        let absent = translate(&doc! {}, &policy).unwrap();
        assert_eq!(absent.controls.limit, Some(5));

        let oversized = translate(&doc! { "$limit": 99 }, &policy).unwrap();
        assert_eq!(oversized.controls.limit, Some(10));

        let zero = translate(&doc! { "$limit": 0 }, &policy).unwrap();
        assert_eq!(zero.controls.limit, Some(0));
    }

    #[test]
    fn accepts_string_and_double_directives() {
        let filter = doc! { "$limit": "4", "$skip": 2.0, "$sort": { "a": "desc", "b": "1" } };
        let translated = translate(&filter, &PaginationPolicy::disabled()).unwrap();

        assert_eq!(translated.controls.limit, Some(4));
        assert_eq!(translated.controls.skip, Some(2));
        assert_eq!(
            translated.controls.sort,
            vec![Sort::new("a", SortDirection::Desc), Sort::new("b", SortDirection::Asc)]
        );
    }

    #[test]
    fn reports_every_malformed_directive() {
        let filter = doc! {
            "$limit": -1,
            "$skip": "many",
            "$sort": { "a": 0 },
            "$select": "name",
        };

        match translate(&filter, &PaginationPolicy::disabled()) {
            Err(ServiceError::Validation(errors)) => {
                let paths = errors.iter().map(|issue| issue.path.as_str()).collect::<Vec<_>>();
                assert_eq!(paths, vec!["$limit", "$skip", "$sort.a", "$select"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn find_query_carries_all_controls() {
        let filter = doc! { "x": 1, "$limit": 2, "$skip": 1, "$sort": { "x": 1 } };
        let query = translate(&filter, &PaginationPolicy::disabled()).unwrap().find_query();

        assert_eq!(query.predicate, doc! { "x": 1 });
        assert_eq!(query.limit, Some(2));
        assert_eq!(query.skip, Some(1));
        assert_eq!(query.sort, vec![Sort::new("x", SortDirection::Asc)]);
    }
}
