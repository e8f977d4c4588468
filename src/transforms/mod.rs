//! Built-in named transforms.
//!
//! | Name | Effect |
//! |---|---|
//! | `_IterateResponse` | serve one element of an array per request, round robin |
//! | `_AdvancedSearch` | filter/sort/paginate an array from the query string |
//! | `_CrudOperation` | REST collection over a per-route working copy |
//! | `_FetchTillData` | keep fetching until a fetch returns data |
//! | `_SetFetchDataToMock` | persist a successful fetch as the route's mock |
//! | `_SetStoreDataToMock` | serve the route store and persist it as mock |
//! | `_MockOnly` / `_FetchOnly` | force the mock or the fetched payload |
//! | `_ReadOnly` | reject non-GET requests with 403 |
//!
//! Stateful transforms keep their state in the route-local store under their
//! own name; those keys are listed in [`CACHE_KEYS`] and dropped whenever a
//! fresh fetch lands.

pub mod crud;
pub mod fetch_control;
pub mod iterate;
pub mod search;

use axum::http::HeaderValue;
use serde_json::Value;

use crate::pipeline::{MiddlewareRegistry, RequestContext};
use crate::query::{link_header, SearchResult};

pub const ITERATE_RESPONSE: &str = "_IterateResponse";
pub const ADVANCED_SEARCH: &str = "_AdvancedSearch";
pub const CRUD_OPERATION: &str = "_CrudOperation";
pub const FETCH_TILL_DATA: &str = "_FetchTillData";
pub const SET_FETCH_DATA_TO_MOCK: &str = "_SetFetchDataToMock";
pub const SET_STORE_DATA_TO_MOCK: &str = "_SetStoreDataToMock";
pub const MOCK_ONLY: &str = "_MockOnly";
pub const FETCH_ONLY: &str = "_FetchOnly";
pub const READ_ONLY: &str = "_ReadOnly";

/// Route-store keys that cache data derived from the current fetch.
pub const CACHE_KEYS: &[&str] = &[ITERATE_RESPONSE, CRUD_OPERATION];

pub fn register_builtins(registry: &mut MiddlewareRegistry) {
    registry
        .register(ITERATE_RESPONSE, iterate::iterate_response)
        .register(ADVANCED_SEARCH, search::advanced_search)
        .register(CRUD_OPERATION, crud::crud_operation)
        .register(FETCH_TILL_DATA, fetch_control::fetch_till_data)
        .register(SET_FETCH_DATA_TO_MOCK, fetch_control::set_fetch_data_to_mock)
        .register(SET_STORE_DATA_TO_MOCK, fetch_control::set_store_data_to_mock)
        .register(MOCK_ONLY, fetch_control::mock_only)
        .register(FETCH_ONLY, fetch_control::fetch_only)
        .register(READ_ONLY, fetch_control::read_only);
}

/// Expose `X-Total-Count` and, when paginated, `Link`.
pub(crate) fn set_result_headers(ctx: &mut RequestContext, result: &SearchResult) {
    ctx.headers
        .insert("X-Total-Count".into(), Value::String(result.total.to_string()));
    let mut exposed = vec!["X-Total-Count"];
    if let Some(pagination) = &result.pagination {
        let link = link_header(ctx.request.uri.path(), &ctx.request.query, pagination);
        if HeaderValue::from_str(&link).is_ok() {
            ctx.headers.insert("Link".into(), Value::String(link));
            exposed.push("Link");
        }
    }
    ctx.headers.insert(
        "Access-Control-Expose-Headers".into(),
        Value::String(exposed.join(", ")),
    );
}
