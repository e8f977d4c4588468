//! Transforms that steer how mock and fetched data are combined.

use axum::http::{Method, StatusCode};
use serde_json::Value;

use crate::error::error_response;
use crate::pipeline::{Flow, Payload, RequestContext};

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// `_FetchTillData`: while fetches fail or come back empty, keep one more
/// attempt in the budget. Once data arrives the budget stays spent.
pub fn fetch_till_data(ctx: &mut RequestContext) -> Flow {
    let Some(data) = &ctx.fetch_data else {
        return Flow::Next;
    };
    if (data.is_error || is_blank(&data.response)) && ctx.route.fetch_count == Some(0) {
        tracing::debug!(route = %ctx.route_path, "No data yet, allowing another fetch");
        ctx.with_route(|route| route.fetch_count = Some(1));
    }
    Flow::Next
}

/// `_SetFetchDataToMock`: persist a successful fetch as the route's mock.
pub fn set_fetch_data_to_mock(ctx: &mut RequestContext) -> Flow {
    if let Some(data) = ctx.fetch_data.as_ref().filter(|d| !d.is_error && !d.is_image) {
        let response = data.response.clone();
        ctx.with_route(|route| route.mock = Some(response));
    }
    Flow::Next
}

/// `_SetStoreDataToMock`: serve the route store and keep it as the mock.
pub fn set_store_data_to_mock(ctx: &mut RequestContext) -> Flow {
    let store = Value::Object(ctx.route.store.clone().unwrap_or_default());
    let mock = store.clone();
    ctx.with_route(|route| route.mock = Some(mock));
    ctx.set_json(store);
    Flow::Next
}

/// `_MockOnly`: discard whatever the fetch stage produced.
pub fn mock_only(ctx: &mut RequestContext) -> Flow {
    ctx.data = Payload::from_mock(ctx.route.mock.as_ref());
    ctx.status_code = ctx.route.status_code;
    ctx.headers = ctx.route.headers.clone().unwrap_or_default();
    Flow::Next
}

/// `_FetchOnly`: serve the fetched payload, error or not.
pub fn fetch_only(ctx: &mut RequestContext) -> Flow {
    let data = ctx.fetch_data.clone().or_else(|| ctx.route.fetch_data.clone());
    match data {
        Some(data) => {
            ctx.status_code = Some(data.status_code);
            ctx.data = match data.binary {
                Some(bytes) if data.is_image => Payload::Binary {
                    bytes,
                    content_type: ctx
                        .headers
                        .get("content-type")
                        .and_then(Value::as_str)
                        .unwrap_or("application/octet-stream")
                        .to_string(),
                },
                _ => Payload::Json(data.response),
            };
        }
        None => ctx.data = Payload::Empty,
    }
    Flow::Next
}

/// `_ReadOnly`: only GET and HEAD get through.
pub fn read_only(ctx: &mut RequestContext) -> Flow {
    if ctx.request.method == Method::GET || ctx.request.method == Method::HEAD {
        return Flow::Next;
    }
    Flow::Respond(error_response(
        StatusCode::FORBIDDEN,
        "forbidden",
        format!("{} is read only", ctx.route_path),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FetchData, RouteDefinition};
    use crate::pipeline::context::testing::context;
    use serde_json::json;

    fn fetched(response: Value) -> FetchData {
        FetchData {
            response,
            status_code: 200,
            ..FetchData::default()
        }
    }

    #[test]
    fn test_fetch_till_data_restores_budget() {
        let route = RouteDefinition {
            fetch_count: Some(0),
            ..RouteDefinition::default()
        };
        let mut ctx = context(Method::GET, route, &[], Value::Null);
        ctx.fetch_data = Some(FetchData::error(500, "down"));
        fetch_till_data(&mut ctx);
        assert_eq!(ctx.slot.read().fetch_count, Some(1));

        ctx.with_route(|r| r.fetch_count = Some(0));
        ctx.fetch_data = Some(fetched(json!([1])));
        fetch_till_data(&mut ctx);
        assert_eq!(ctx.slot.read().fetch_count, Some(0));
    }

    #[test]
    fn test_set_fetch_data_to_mock() {
        let mut ctx = context(Method::GET, RouteDefinition::default(), &[], Value::Null);
        ctx.fetch_data = Some(fetched(json!({"a": 1})));
        set_fetch_data_to_mock(&mut ctx);
        assert_eq!(ctx.slot.read().mock, Some(json!({"a": 1})));

        ctx.fetch_data = Some(FetchData::error(500, "x"));
        set_fetch_data_to_mock(&mut ctx);
        assert_eq!(ctx.slot.read().mock, Some(json!({"a": 1})));
    }

    #[test]
    fn test_set_store_data_to_mock() {
        let mut store = serde_json::Map::new();
        store.insert("count".into(), json!(2));
        let route = RouteDefinition {
            store: Some(store),
            ..RouteDefinition::default()
        };
        let mut ctx = context(Method::GET, route, &[], Value::Null);
        set_store_data_to_mock(&mut ctx);
        assert_eq!(ctx.data, Payload::Json(json!({"count": 2})));
        assert_eq!(ctx.slot.read().mock, Some(json!({"count": 2})));
    }

    #[test]
    fn test_mock_only_and_fetch_only() {
        let route = RouteDefinition {
            mock: Some(json!("mock")),
            ..RouteDefinition::default()
        };
        let mut ctx = context(Method::GET, route, &[], Value::Null);
        ctx.fetch_data = Some(FetchData::error(502, "bad gateway"));
        ctx.data = Payload::Json(json!("fetched"));

        mock_only(&mut ctx);
        assert_eq!(ctx.data, Payload::Json(json!("mock")));

        fetch_only(&mut ctx);
        assert_eq!(ctx.data, Payload::Json(json!("bad gateway")));
        assert_eq!(ctx.status_code, Some(502));
    }

    #[test]
    fn test_read_only() {
        let mut ctx = context(Method::GET, RouteDefinition::default(), &[], Value::Null);
        assert!(matches!(read_only(&mut ctx), Flow::Next));

        let mut ctx = context(Method::POST, RouteDefinition::default(), &[], Value::Null);
        match read_only(&mut ctx) {
            Flow::Respond(response) => assert_eq!(response.status(), StatusCode::FORBIDDEN),
            Flow::Next => panic!("expected 403"),
        }
    }
}
