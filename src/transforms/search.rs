//! `_AdvancedSearch`: read-only query over an array.

use serde_json::Value;

use crate::pipeline::{Flow, RequestContext};
use crate::query::{search, Query};
use crate::transforms::set_result_headers;

pub fn advanced_search(ctx: &mut RequestContext) -> Flow {
    let Some(Value::Array(items)) = ctx.data.as_json() else {
        tracing::warn!(route = %ctx.route_path, "_AdvancedSearch needs an array, skipping");
        return Flow::Next;
    };

    let query = Query::from_pairs(&ctx.request.query);
    if query.is_empty() {
        return Flow::Next;
    }
    let result = search(items, &query);
    set_result_headers(ctx, &result);
    ctx.set_json(result.into_value());
    Flow::Next
}
