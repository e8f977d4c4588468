//! `_CrudOperation`: a REST collection over the route's data.
//!
//! The first request copies `data` into the route store; every later read and
//! write works on that copy until a fresh fetch drops it.
//!
//! ```text
//! GET    /items          search (filters, sort, pagination, X-Total-Count)
//! GET    /items/:id      one record, 404 if absent
//! POST   /items          insert, 201
//! PUT    /items/:id      replace (id kept)
//! PATCH  /items/:id      merge
//! DELETE /items/:id      remove
//! PUT|PATCH|DELETE /items?query  apply to every matching record
//! ```

use axum::http::{Method, StatusCode};
use serde_json::{Map, Value};

use crate::pipeline::{Flow, RequestContext};
use crate::query::{self, Query, SearchResult};
use crate::transforms::{set_result_headers, CRUD_OPERATION};

/// Result of one operation on the working copy.
#[derive(Debug, PartialEq)]
struct Reply {
    status: StatusCode,
    body: Value,
    search: Option<SearchResult>,
}

impl Reply {
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            search: None,
        }
    }

    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: Value::Object(Map::new()),
            search: None,
        }
    }
}

fn is_collection(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.iter().all(Value::is_object))
}

/// Indices targeted by an id, or by the query when no id was given.
///
/// Without an id the query must filter something; a bare collection URL
/// targets nothing.
fn targets(records: &[Value], id: Option<&str>, pairs: &[(String, String)], id_field: &str) -> Vec<usize> {
    match id {
        Some(id) => query::find_index(records, id_field, id).into_iter().collect(),
        None => {
            let query = Query::from_pairs(pairs);
            if !query.selects() {
                return Vec::new();
            }
            records
                .iter()
                .enumerate()
                .filter(|(_, r)| query.matches(r))
                .map(|(i, _)| i)
                .collect()
        }
    }
}

fn execute(
    records: &mut Vec<Value>,
    method: &Method,
    id: Option<&str>,
    pairs: &[(String, String)],
    body: &Value,
    id_field: &str,
) -> Option<Reply> {
    let reply = match *method {
        Method::GET => match id {
            Some(id) => match query::find_index(records, id_field, id) {
                Some(i) => Reply::ok(records[i].clone()),
                None => Reply::not_found(),
            },
            None => {
                let result = query::search(records, &Query::from_pairs(pairs));
                Reply {
                    status: StatusCode::OK,
                    body: result.clone().into_value(),
                    search: Some(result),
                }
            }
        },
        Method::POST => {
            let inserted = query::insert(records, body.clone(), id_field);
            let body = match (body, inserted.len()) {
                (_, 0) => {
                    return Some(Reply {
                        status: StatusCode::BAD_REQUEST,
                        body: Value::Object(Map::new()),
                        search: None,
                    })
                }
                (Value::Array(_), _) => Value::Array(inserted),
                (_, _) => inserted.into_iter().next().unwrap_or(Value::Null),
            };
            Reply {
                status: StatusCode::CREATED,
                body,
                search: None,
            }
        }
        Method::PUT | Method::PATCH => {
            let indices = targets(records, id, pairs, id_field);
            if indices.is_empty() {
                return Some(Reply::not_found());
            }
            let mut changed = Vec::with_capacity(indices.len());
            for i in indices {
                if *method == Method::PUT {
                    query::replace(&mut records[i], body, id_field);
                } else {
                    query::update(&mut records[i], body, id_field);
                }
                changed.push(records[i].clone());
            }
            Reply::ok(single_or_many(id, changed))
        }
        Method::DELETE => {
            let indices = targets(records, id, pairs, id_field);
            if indices.is_empty() {
                return Some(Reply::not_found());
            }
            let removed = query::remove(records, &indices);
            Reply::ok(single_or_many(id, removed))
        }
        _ => return None,
    };
    Some(reply)
}

fn single_or_many(id: Option<&str>, mut records: Vec<Value>) -> Value {
    if id.is_some() && records.len() == 1 {
        records.pop().unwrap_or(Value::Null)
    } else {
        Value::Array(records)
    }
}

pub fn crud_operation(ctx: &mut RequestContext) -> Flow {
    let id_field = ctx.id_field().to_string();
    let id = ctx
        .request
        .params
        .get(&id_field)
        .or_else(|| ctx.request.params.get("id"))
        .cloned();
    let method = ctx.request.method.clone();
    let pairs = ctx.request.query.clone();
    let body = ctx.request.body.clone();
    let source = ctx.data.as_json().cloned();

    let reply = ctx.with_route(|route| {
        let store = route.store_mut();
        if !store.get(CRUD_OPERATION).is_some_and(is_collection) {
            match source {
                Some(data) if is_collection(&data) => {
                    store.insert(CRUD_OPERATION.to_string(), data);
                }
                _ => return Err(()),
            }
        }
        match store.get_mut(CRUD_OPERATION) {
            Some(Value::Array(records)) => Ok(execute(records, &method, id.as_deref(), &pairs, &body, &id_field)),
            _ => Err(()),
        }
    });

    match reply {
        Err(()) => {
            tracing::warn!(route = %ctx.route_path, "_CrudOperation needs an array of objects, skipping");
        }
        Ok(None) => {}
        Ok(Some(reply)) => {
            if let Some(result) = &reply.search {
                set_result_headers(ctx, result);
            }
            ctx.status_code = Some(reply.status.as_u16());
            ctx.set_json(reply.body);
        }
    }
    Flow::Next
}
