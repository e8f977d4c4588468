//! Fetch stage: resolve the route's fetch and expose the outcome as response data.

use crate::db::FetchData;
use crate::fetch::{FetchOutcome, FetchResolver};
use crate::pipeline::context::{Payload, RequestContext};

const DEFAULT_IMAGE_TYPE: &str = "application/octet-stream";

pub async fn run(resolver: &FetchResolver, ctx: &mut RequestContext) {
    if ctx.route.is_mock_first() && ctx.route.mock.is_some() {
        return;
    }
    if !ctx.route.has_fetch() {
        return;
    }

    let tpl = ctx.template();
    let outcome = resolver.resolve(&ctx.route_path, &ctx.slot, &tpl).await;
    ctx.reload_route();

    match outcome {
        FetchOutcome::Skipped | FetchOutcome::Cached(None) => {}
        FetchOutcome::Stream(path) => ctx.data = Payload::File(path),
        FetchOutcome::Cached(Some(data)) | FetchOutcome::Fetched(data) => apply(ctx, data),
    }
}

/// Expose a fetch outcome, honouring `skipFetchError`.
pub fn apply(ctx: &mut RequestContext, data: FetchData) {
    ctx.fetch_data = Some(data.clone());

    if data.is_error && ctx.route.skips_fetch_error() {
        tracing::debug!(route = %ctx.route_path, status = data.status_code, "Fetch failed, serving mock");
        return;
    }

    ctx.status_code = Some(data.status_code);
    let mut headers = data.headers;
    if let Some(configured) = &ctx.route.headers {
        headers.extend(configured.clone());
    }
    ctx.headers = headers;

    ctx.data = match data.binary {
        Some(bytes) if data.is_image => {
            let content_type = ctx
                .headers
                .get("content-type")
                .and_then(|v| v.as_str())
                .unwrap_or(DEFAULT_IMAGE_TYPE)
                .to_string();
            Payload::Binary { bytes, content_type }
        }
        _ => Payload::Json(data.response),
    };
}
