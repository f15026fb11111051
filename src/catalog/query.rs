//! Listing queries built from raw query-string parameters.
//!
//! `QuerySpec` parses and validates the request parameters once; `ProductQuery`
//! then accumulates predicates through chained calls and renders them as a
//! parameterised SQL statement:
//!
//! ```ignore
//! let query = ProductQuery::new(&spec).search().filter().pagination(4);
//! let products = query.fetch(&pool).await?;
//! ```

use sqlx::{QueryBuilder, Sqlite};

use crate::db::{DbPool, Product};

use super::QueryError;

/// Parameters that are never turned into field filters
const RESERVED_PARAMS: &[&str] = &["keyword", "category", "page", "limit", "includeDeleted"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ComparisonOp {
    fn from_key(op: &str) -> Option<Self> {
        match op {
            "eq" => Some(ComparisonOp::Eq),
            "gt" => Some(ComparisonOp::Gt),
            "gte" => Some(ComparisonOp::Gte),
            "lt" => Some(ComparisonOp::Lt),
            "lte" => Some(ComparisonOp::Lte),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Numeric,
    Text,
}

/// Filterable fields: (query parameter, column, kind)
const FILTERABLE: &[(&str, &str, FieldKind)] = &[
    ("price", "price", FieldKind::Numeric),
    ("ratings", "ratings", FieldKind::Numeric),
    ("stock", "stock", FieldKind::Numeric),
    ("numOfReviews", "num_of_reviews", FieldKind::Numeric),
    ("seller", "seller", FieldKind::Text),
    ("name", "name", FieldKind::Text),
];

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

/// One validated `field[op]=value` restriction
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub column: &'static str,
    pub op: ComparisonOp,
    pub value: FilterValue,
}

/// Validated listing parameters for one request
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub page: Option<String>,
    pub filters: Vec<FieldFilter>,
}

impl QuerySpec {
    pub fn from_pairs<I>(pairs: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut spec = QuerySpec::default();

        for (key, value) in pairs {
            match key.as_str() {
                "keyword" => spec.keyword = non_empty(value),
                "category" => spec.category = non_empty(value),
                "page" => spec.page = Some(value),
                k if RESERVED_PARAMS.contains(&k) => {}
                _ => spec.filters.push(parse_filter(&key, value)?),
            }
        }

        Ok(spec)
    }

    /// Requested page, with anything missing, malformed or below one read as 1
    pub fn current_page(&self) -> u32 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<i64>().ok())
            .map(|p| p.clamp(1, u32::MAX as i64) as u32)
            .unwrap_or(1)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split `price[gte]` into `("price", Some("gte"))`
fn split_key(key: &str) -> (&str, Option<&str>) {
    match key.split_once('[') {
        Some((field, rest)) if rest.ends_with(']') => (field, Some(&rest[..rest.len() - 1])),
        _ => (key, None),
    }
}

fn parse_filter(key: &str, value: String) -> Result<FieldFilter, QueryError> {
    let (field, op) = split_key(key);

    let &(_, column, kind) = FILTERABLE
        .iter()
        .find(|(param, _, _)| *param == field)
        .ok_or_else(|| QueryError::UnknownField(key.to_string()))?;

    let unsupported = || QueryError::UnsupportedOperator {
        field: field.to_string(),
        op: op.unwrap_or("eq").to_string(),
    };

    let op = match op {
        None => ComparisonOp::Eq,
        Some(op) => ComparisonOp::from_key(op).ok_or_else(unsupported)?,
    };

    let value = match kind {
        FieldKind::Numeric => {
            let number = value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| QueryError::InvalidNumber {
                    field: field.to_string(),
                    value: value.clone(),
                })?;
            FilterValue::Number(number)
        }
        FieldKind::Text if op == ComparisonOp::Eq => FilterValue::Text(value),
        FieldKind::Text => return Err(unsupported()),
    };

    Ok(FieldFilter {
        column,
        op,
        value,
    })
}

/// Escape LIKE wildcards so user input matches literally
fn like_pattern(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len() + 2);
    escaped.push('%');
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_joiner(qb: &mut QueryBuilder<'_, Sqlite>, first: &mut bool) {
    qb.push(if *first { " WHERE " } else { " AND " });
    *first = false;
}

#[derive(Debug, Clone)]
enum Predicate {
    Contains { column: &'static str, pattern: String },
    Field(FieldFilter),
}

#[derive(Debug, Clone, Copy)]
struct Page {
    limit: u32,
    offset: u64,
}

/// Chainable listing query over the products table
#[derive(Debug, Clone)]
pub struct ProductQuery<'a> {
    spec: &'a QuerySpec,
    predicates: Vec<Predicate>,
    include_deleted: bool,
    page: Option<Page>,
}

impl<'a> ProductQuery<'a> {
    pub fn new(spec: &'a QuerySpec) -> Self {
        Self {
            spec,
            predicates: Vec::new(),
            include_deleted: false,
            page: None,
        }
    }

    /// Keyword matches inside the name, category inside the category.
    ///
    /// Both sides are lowercased in Rust; the stored `*_search` columns hold
    /// the folded values.
    pub fn search(mut self) -> Self {
        if let Some(keyword) = &self.spec.keyword {
            self.predicates.push(Predicate::Contains {
                column: "name_search",
                pattern: like_pattern(&keyword.to_lowercase()),
            });
        }
        if let Some(category) = &self.spec.category {
            self.predicates.push(Predicate::Contains {
                column: "category_search",
                pattern: like_pattern(&category.to_lowercase()),
            });
        }
        self
    }

    pub fn filter(mut self) -> Self {
        self.predicates
            .extend(self.spec.filters.iter().cloned().map(Predicate::Field));
        self
    }

    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    pub fn pagination(mut self, per_page: u32) -> Self {
        let per_page = per_page.max(1);
        let current = self.spec.current_page();
        self.page = Some(Page {
            limit: per_page,
            offset: per_page as u64 * (current as u64 - 1),
        });
        self
    }

    pub fn current_page(&self) -> u32 {
        self.spec.current_page()
    }

    fn push_conditions(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        let mut first = true;

        if !self.include_deleted {
            push_joiner(qb, &mut first);
            qb.push("is_deleted = 0");
        }

        for predicate in &self.predicates {
            push_joiner(qb, &mut first);
            match predicate {
                Predicate::Contains { column, pattern } => {
                    qb.push(*column)
                        .push(" LIKE ")
                        .push_bind(pattern.clone())
                        .push(" ESCAPE '\\'");
                }
                Predicate::Field(filter) => {
                    qb.push(filter.column).push(" ").push(filter.op.sql()).push(" ");
                    match &filter.value {
                        FilterValue::Number(n) => qb.push_bind(*n),
                        FilterValue::Text(t) => qb.push_bind(t.clone()),
                    };
                }
            }
        }
    }

    pub fn to_select(&self) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new("SELECT * FROM products");
        self.push_conditions(&mut qb);
        qb.push(" ORDER BY created_at DESC, rowid DESC");
        if let Some(page) = self.page {
            qb.push(" LIMIT ")
                .push_bind(page.limit as i64)
                .push(" OFFSET ")
                .push_bind(page.offset as i64);
        }
        qb
    }

    pub fn to_count(&self) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM products");
        self.push_conditions(&mut qb);
        qb
    }

    pub async fn fetch(&self, pool: &DbPool) -> Result<Vec<Product>, QueryError> {
        let mut qb = self.to_select();
        Ok(qb.build_query_as::<Product>().fetch_all(pool).await?)
    }

    /// Matching rows, ignoring pagination
    pub async fn count(&self, pool: &DbPool) -> Result<i64, QueryError> {
        let mut qb = self.to_count();
        Ok(qb.build_query_scalar::<i64>().fetch_one(pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn spec(items: &[(&str, &str)]) -> QuerySpec {
        QuerySpec::from_pairs(pairs(items)).unwrap()
    }

    #[test]
    fn test_operator_keys_become_comparisons() {
        let spec = spec(&[("price[gte]", "10"), ("price[lt]", "200"), ("ratings", "4")]);
        assert_eq!(spec.filters.len(), 3);
        assert_eq!(spec.filters[0].op, ComparisonOp::Gte);
        assert_eq!(spec.filters[1].op, ComparisonOp::Lt);
        assert_eq!(spec.filters[2].op, ComparisonOp::Eq);
        assert_eq!(spec.filters[2].value, FilterValue::Number(4.0));
    }

    #[test]
    fn test_reserved_params_are_not_filters() {
        let spec = spec(&[
            ("keyword", "camera"),
            ("category", "Cameras"),
            ("page", "2"),
            ("limit", "50"),
            ("includeDeleted", "true"),
        ]);
        assert!(spec.filters.is_empty());
        assert_eq!(spec.keyword.as_deref(), Some("camera"));
        assert_eq!(spec.category.as_deref(), Some("Cameras"));
    }

    #[test]
    fn test_blank_keyword_means_no_search() {
        let spec = spec(&[("keyword", "  ")]);
        assert!(spec.keyword.is_none());
    }

    #[test]
    fn test_rejects_unknown_field_and_operator() {
        let err = QuerySpec::from_pairs(pairs(&[("password", "x")])).unwrap_err();
        assert!(matches!(err, QueryError::UnknownField(_)));

        let err = QuerySpec::from_pairs(pairs(&[("price[ne]", "1")])).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedOperator { .. }));

        let err = QuerySpec::from_pairs(pairs(&[("seller[gt]", "a")])).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedOperator { .. }));

        let err = QuerySpec::from_pairs(pairs(&[("price[gt]", "cheap")])).unwrap_err();
        assert!(matches!(err, QueryError::InvalidNumber { .. }));
    }

    #[test]
    fn test_current_page_defaults_to_one() {
        assert_eq!(spec(&[]).current_page(), 1);
        assert_eq!(spec(&[("page", "0")]).current_page(), 1);
        assert_eq!(spec(&[("page", "-3")]).current_page(), 1);
        assert_eq!(spec(&[("page", "abc")]).current_page(), 1);
        assert_eq!(spec(&[("page", "3")]).current_page(), 3);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_rendered_sql() {
        let spec = spec(&[("keyword", "cam"), ("price[gt]", "100"), ("page", "2")]);
        let query = ProductQuery::new(&spec).search().filter().pagination(4);
        assert_eq!(
            query.to_select().sql(),
            "SELECT * FROM products WHERE is_deleted = 0 AND name_search LIKE ? ESCAPE '\\' AND price > ? ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?"
        );

        let query = ProductQuery::new(&spec).include_deleted(true);
        assert_eq!(query.to_count().sql(), "SELECT COUNT(*) FROM products");
    }
}
