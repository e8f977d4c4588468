//! `_IterateResponse`: one array element per request.

use serde_json::{json, Value};

use crate::pipeline::{Flow, RequestContext};
use crate::transforms::ITERATE_RESPONSE;

pub fn iterate_response(ctx: &mut RequestContext) -> Flow {
    let Some(Value::Array(items)) = ctx.data.as_json().cloned() else {
        tracing::warn!(route = %ctx.route_path, "_IterateResponse needs an array, skipping");
        return Flow::Next;
    };
    if items.is_empty() {
        return Flow::Next;
    }

    let len = items.len();
    let index = ctx.with_route(|route| {
        let store = route.store_mut();
        let index = store
            .get(ITERATE_RESPONSE)
            .and_then(Value::as_u64)
            .map_or(0, |i| i as usize % len);
        store.insert(ITERATE_RESPONSE.to_string(), json!((index + 1) % len));
        index
    });

    ctx.set_json(items[index].clone());
    Flow::Next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RouteDefinition;
    use crate::pipeline::context::testing::context;
    use crate::pipeline::Payload;
    use axum::http::Method;
    use std::sync::Arc;

    #[test]
    fn test_round_robin_across_requests() {
        let route = RouteDefinition::from_mock(json!(["a", "b", "c"]));
        let mut first = context(Method::GET, route, &[], Value::Null);
        let slot = first.slot.clone();
        iterate_response(&mut first);
        assert_eq!(first.data, Payload::Json(json!("a")));

        let mut served = Vec::new();
        for _ in 0..3 {
            let mut ctx = context(Method::GET, slot.read(), &[], Value::Null);
            ctx.slot = Arc::clone(&slot);
            iterate_response(&mut ctx);
            served.push(ctx.data.as_json().cloned().unwrap());
        }
        assert_eq!(served, vec![json!("b"), json!("c"), json!("a")]);
    }

    #[test]
    fn test_non_array_untouched() {
        let mut ctx = context(Method::GET, RouteDefinition::from_mock(json!({"a": 1})), &[], Value::Null);
        assert!(matches!(iterate_response(&mut ctx), Flow::Next));
        assert_eq!(ctx.data, Payload::Json(json!({"a": 1})));
    }
}
