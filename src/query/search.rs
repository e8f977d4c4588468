//! Filtering, sorting and pagination.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

pub const DEFAULT_PER_PAGE: usize = 10;

/// Comparison applied by one filter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl FilterOp {
    const SUFFIXES: [(&'static str, FilterOp); 6] = [
        ("_ne", FilterOp::Ne),
        ("_lt", FilterOp::Lt),
        ("_lte", FilterOp::Lte),
        ("_gt", FilterOp::Gt),
        ("_gte", FilterOp::Gte),
        ("_like", FilterOp::Like),
    ];

    /// Split `age_gte` into (`age`, Gte).
    fn parse_key(key: &str) -> (&str, FilterOp) {
        for (suffix, op) in Self::SUFFIXES {
            if let Some(field) = key.strip_suffix(suffix) {
                if !field.is_empty() {
                    return (field, op);
                }
            }
        }
        (key, FilterOp::Eq)
    }
}

/// One field condition; a record passes when any of `values` passes.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub values: Vec<String>,
    patterns: Vec<Regex>,
}

impl Filter {
    fn new(field: &str, op: FilterOp) -> Self {
        Self {
            field: field.to_string(),
            op,
            values: Vec::new(),
            patterns: Vec::new(),
        }
    }

    fn push(&mut self, value: &str) {
        if self.op == FilterOp::Like {
            let pattern = RegexBuilder::new(value)
                .case_insensitive(true)
                .build()
                .or_else(|_| {
                    RegexBuilder::new(&regex::escape(value))
                        .case_insensitive(true)
                        .build()
                });
            if let Ok(pattern) = pattern {
                self.patterns.push(pattern);
            }
        }
        self.values.push(value.to_string());
    }

    pub fn matches(&self, record: &Value) -> bool {
        let value = lookup(record, &self.field);
        match self.op {
            FilterOp::Eq => self.values.iter().any(|q| value.is_some_and(|v| equals(v, q))),
            FilterOp::Ne => self.values.iter().all(|q| !value.is_some_and(|v| equals(v, q))),
            FilterOp::Like => value.is_some_and(|v| {
                let text = text_of(v);
                self.patterns.iter().any(|p| p.is_match(&text))
            }),
            op => self.values.iter().any(|q| {
                value.is_some_and(|v| {
                    let ord = compare_to_query(v, q);
                    match op {
                        FilterOp::Lt => ord == Ordering::Less,
                        FilterOp::Lte => ord != Ordering::Greater,
                        FilterOp::Gt => ord == Ordering::Greater,
                        _ => ord != Ordering::Less,
                    }
                })
            }),
        }
    }
}

/// Parsed query-string controls.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub text: Option<String>,
    /// (field, descending)
    pub sort: Vec<(String, bool)>,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub limit: Option<usize>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub first: bool,
    pub last: bool,
}

fn flag(value: &str) -> bool {
    !matches!(value.trim(), "false" | "0")
}

impl Query {
    /// Build from decoded query pairs, keeping repeated keys.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut query = Query::default();
        let mut sort_fields: Vec<String> = Vec::new();
        let mut orders: Vec<String> = Vec::new();

        for (key, value) in pairs {
            match key.as_str() {
                "_sort" => sort_fields.extend(value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty())),
                "_order" => orders.extend(value.split(',').map(|s| s.trim().to_ascii_lowercase())),
                "_text" | "q" => query.text = Some(value.clone()).filter(|v| !v.is_empty()),
                "_start" => query.start = value.parse().ok(),
                "_end" => query.end = value.parse().ok(),
                "_limit" => query.limit = value.parse().ok(),
                "_page" => query.page = value.parse().ok().filter(|p| *p > 0),
                "_per_page" => query.per_page = value.parse().ok().filter(|p| *p > 0),
                "_first" => query.first = flag(value),
                "_last" => query.last = flag(value),
                k if k.starts_with('_') && FilterOp::parse_key(k).1 == FilterOp::Eq => {}
                k => {
                    let (field, op) = FilterOp::parse_key(k);
                    let idx = match query.filters.iter().position(|f| f.field == field && f.op == op) {
                        Some(idx) => idx,
                        None => {
                            query.filters.push(Filter::new(field, op));
                            query.filters.len() - 1
                        }
                    };
                    query.filters[idx].push(value);
                }
            }
        }

        query.sort = sort_fields
            .into_iter()
            .enumerate()
            .map(|(i, field)| {
                let desc = orders.get(i).or(orders.last()).is_some_and(|o| o == "desc");
                (field, desc)
            })
            .collect();
        query
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
            && self.text.is_none()
            && self.sort.is_empty()
            && self.start.is_none()
            && self.end.is_none()
            && self.limit.is_none()
            && self.page.is_none()
            && !self.first
            && !self.last
    }

    /// Whether the query narrows the record set at all.
    pub fn selects(&self) -> bool {
        !self.filters.is_empty() || self.text.is_some()
    }

    /// Whether a record passes every filter and the text search.
    pub fn matches(&self, record: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(record))
            && self
                .text
                .as_deref()
                .is_none_or(|t| contains_text(record, &t.to_lowercase()))
    }
}

/// Page position after pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
    pub last_page: usize,
}

impl Pagination {
    /// `(rel, page)` pairs for a Link header.
    pub fn links(&self) -> Vec<(&'static str, usize)> {
        let mut links = vec![("first", 1)];
        if self.page > 1 {
            links.push(("prev", (self.page - 1).min(self.last_page)));
        }
        if self.page < self.last_page {
            links.push(("next", self.page + 1));
        }
        links.push(("last", self.last_page));
        links
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Many(Vec<Value>),
    One(Option<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub selection: Selection,
    /// Matched count before slicing.
    pub total: usize,
    pub pagination: Option<Pagination>,
}

impl SearchResult {
    /// Response body: an array, or a single record (`{}` when none).
    pub fn into_value(self) -> Value {
        match self.selection {
            Selection::Many(items) => Value::Array(items),
            Selection::One(item) => item.unwrap_or_else(|| Value::Object(Map::new())),
        }
    }
}

/// Run a query over `records`.
pub fn search(records: &[Value], query: &Query) -> SearchResult {
    let mut items: Vec<Value> = records.iter().filter(|r| query.matches(r)).cloned().collect();
    let total = items.len();

    if !query.sort.is_empty() {
        items.sort_by(|a, b| {
            query
                .sort
                .iter()
                .map(|(field, desc)| {
                    let ord = compare_values(lookup(a, field), lookup(b, field));
                    if *desc {
                        ord.reverse()
                    } else {
                        ord
                    }
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }

    let mut pagination = None;
    if let Some(page) = query.page {
        let per_page = query.per_page.or(query.limit).unwrap_or(DEFAULT_PER_PAGE).max(1);
        let last_page = total.div_ceil(per_page).max(1);
        items = items.into_iter().skip(page.saturating_sub(1).saturating_mul(per_page)).take(per_page).collect();
        pagination = Some(Pagination { page, per_page, last_page });
    } else if query.start.is_some() || query.end.is_some() || query.limit.is_some() {
        let start = query.start.unwrap_or(0).min(total);
        let end = query
            .end
            .or(query.limit.map(|l| start.saturating_add(l)))
            .unwrap_or(total)
            .clamp(start, total);
        items.truncate(end);
        items.drain(..start);
    }

    let selection = if query.first {
        Selection::One(items.into_iter().next())
    } else if query.last {
        Selection::One(items.pop())
    } else {
        Selection::Many(items)
    };

    SearchResult { selection, total, pagination }
}

/// RFC 5988 `Link` header value for a paginated result.
pub fn link_header(path: &str, pairs: &[(String, String)], pagination: &Pagination) -> String {
    pagination
        .links()
        .into_iter()
        .map(|(rel, page)| {
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in pairs.iter().filter(|(k, _)| k != "_page") {
                query.append_pair(k, v);
            }
            query.append_pair("_page", &page.to_string());
            format!("<{}?{}>; rel=\"{}\"", path, query.finish(), rel)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve a dotted field path (`author.name`, `tags.0`).
pub(crate) fn lookup<'a>(record: &'a Value, field: &str) -> Option<&'a Value> {
    field.split('.').try_fold(record, |current, part| match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => items.get(part.parse::<usize>().ok()?),
        _ => None,
    })
}

pub(crate) fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn equals(value: &Value, query: &str) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|item| text_of(item) == query),
        other => text_of(other) == query,
    }
}

fn compare_to_query(value: &Value, query: &str) -> Ordering {
    match (as_number(value), query.trim().parse::<f64>()) {
        (Some(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => text_of(value).as_str().cmp(query),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => text_of(x).cmp(&text_of(y)),
    }
}

fn contains_text(value: &Value, needle: &str) -> bool {
    match value {
        Value::Object(map) => map.values().any(|v| contains_text(v, needle)),
        Value::Array(items) => items.iter().any(|v| contains_text(v, needle)),
        Value::Null => false,
        other => text_of(other).to_lowercase().contains(needle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn users() -> Vec<Value> {
        vec![
            json!({"id": 1, "name": "Siva", "age": 30, "address": {"city": "Chennai"}}),
            json!({"id": 2, "name": "Ravi", "age": 25, "address": {"city": "Madurai"}}),
            json!({"id": 3, "name": "Siva", "age": 41, "address": {"city": "Salem"}}),
            json!({"id": 4, "name": "Anu", "age": 19, "address": {"city": "Chennai"}}),
        ]
    }

    fn ids(result: SearchResult) -> Vec<i64> {
        match result.selection {
            Selection::Many(items) => items.iter().map(|r| r["id"].as_i64().unwrap()).collect(),
            Selection::One(item) => item.map(|r| r["id"].as_i64().unwrap()).into_iter().collect(),
        }
    }

    fn run(items: &[(&str, &str)]) -> SearchResult {
        search(&users(), &Query::from_pairs(&pairs(items)))
    }

    #[test]
    fn test_equality_filter() {
        assert_eq!(ids(run(&[("name", "Siva")])), vec![1, 3]);
        assert_eq!(ids(run(&[("address.city", "Chennai")])), vec![1, 4]);
        assert_eq!(ids(run(&[("id", "2")])), vec![2]);
    }

    #[test]
    fn test_repeated_keys_or_distinct_keys_and() {
        assert_eq!(ids(run(&[("id", "1"), ("id", "2")])), vec![1, 2]);
        assert_eq!(ids(run(&[("name", "Siva"), ("address.city", "Salem")])), vec![3]);
    }

    #[test]
    fn test_repeated_ne_excludes_every_value() {
        assert_eq!(ids(run(&[("id_ne", "1"), ("id_ne", "2")])), vec![3, 4]);
    }

    #[test]
    fn test_comparison_suffixes() {
        assert_eq!(ids(run(&[("age_gte", "30")])), vec![1, 3]);
        assert_eq!(ids(run(&[("age_lt", "25")])), vec![4]);
        assert_eq!(ids(run(&[("age_lte", "25"), ("age_gt", "19")])), vec![2]);
        assert_eq!(ids(run(&[("name_ne", "Siva")])), vec![2, 4]);
        assert_eq!(ids(run(&[("name_like", "^s")])), vec![1, 3]);
        assert_eq!(ids(run(&[("name_like", "(")])), Vec::<i64>::new());
    }

    #[test]
    fn test_full_text() {
        assert_eq!(ids(run(&[("q", "madu")])), vec![2]);
        assert_eq!(ids(run(&[("_text", "41")])), vec![3]);
    }

    #[test]
    fn test_sort() {
        assert_eq!(ids(run(&[("_sort", "id"), ("_order", "desc")])), vec![4, 3, 2, 1]);
        assert_eq!(ids(run(&[("_sort", "name,age"), ("_order", "asc,desc")])), vec![4, 2, 3, 1]);
    }

    #[test]
    fn test_slice() {
        let result = run(&[("_start", "1"), ("_end", "3")]);
        assert_eq!(result.total, 4);
        assert_eq!(ids(result), vec![2, 3]);
        assert_eq!(ids(run(&[("_start", "2"), ("_limit", "5")])), vec![3, 4]);
        assert_eq!(ids(run(&[("_start", "9")])), Vec::<i64>::new());
    }

    #[test]
    fn test_pagination() {
        let result = run(&[("_page", "2"), ("_per_page", "3")]);
        assert_eq!(result.total, 4);
        assert_eq!(
            result.pagination,
            Some(Pagination { page: 2, per_page: 3, last_page: 2 })
        );
        assert_eq!(ids(result), vec![4]);
    }

    #[test]
    fn test_huge_offsets_yield_empty_pages() {
        let max = usize::MAX.to_string();
        let max = max.as_str();
        let result = run(&[("_page", max), ("_per_page", "2")]);
        assert_eq!(result.total, 4);
        assert_eq!(ids(result), Vec::<i64>::new());

        assert_eq!(ids(run(&[("_start", "1"), ("_limit", max)])), vec![2, 3, 4]);
        assert_eq!(ids(run(&[("_page", "2"), ("_per_page", max)])), Vec::<i64>::new());
    }

    #[test]
    fn test_first_and_last() {
        assert_eq!(ids(run(&[("name", "Siva"), ("_first", "true")])), vec![1]);
        assert_eq!(ids(run(&[("name", "Siva"), ("_last", "")])), vec![3]);
        assert_eq!(run(&[("name", "Nobody"), ("_first", "true")]).into_value(), json!({}));
    }

    #[test]
    fn test_unknown_reserved_keys_ignored() {
        assert_eq!(run(&[("_embed", "posts")]).total, 4);
    }

    #[test]
    fn test_link_header() {
        let pagination = Pagination { page: 2, per_page: 1, last_page: 3 };
        let header = link_header("/users", &pairs(&[("name", "a b"), ("_page", "2")]), &pagination);
        assert_eq!(
            header,
            "</users?name=a+b&_page=1>; rel=\"first\", \
             </users?name=a+b&_page=1>; rel=\"prev\", \
             </users?name=a+b&_page=3>; rel=\"next\", \
             </users?name=a+b&_page=3>; rel=\"last\""
        );
    }
}
