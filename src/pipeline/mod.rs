//! Request middleware pipeline.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → strip base, apply rewriters, match route (404 if none)
//!     → initializer.rs (seed data/status/headers from the route; 307 for
//!       unfilled optional params on fetch routes)
//!     → fetch_stage.rs (unless mockFirst or a handler-backed route)
//!     → delay
//!     → named / inline middlewares, in order (any may respond early)
//!     → finalizer.rs (status, headers, body)
//! ```
//!
//! # Design Decisions
//! - Middlewares are synchronous; anything they need is already on the context
//! - A panicking middleware becomes a 500 with the panic message as body
//! - Route state is written through the route slot, never held across awaits

pub mod context;
pub mod fetch_stage;
pub mod finalizer;
pub mod initializer;
pub mod registry;

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};

use crate::error::error_response;
use crate::http::AppState;
use crate::observability::metrics;
use crate::routing::{PathParams, RouteMatch};

pub use context::{Payload, RequestContext, RequestInfo};
pub use registry::MiddlewareRegistry;

/// What a middleware wants to happen next.
pub enum Flow {
    /// Continue with the next middleware, then the final stage.
    Next,
    /// Stop here and send this response.
    Respond(Response),
}

/// A request transform selected by name or attached inline to a route.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: &mut RequestContext) -> Flow;
}

impl<F> Middleware for F
where
    F: Fn(&mut RequestContext) -> Flow + Send + Sync,
{
    fn handle(&self, ctx: &mut RequestContext) -> Flow {
        self(ctx)
    }
}

/// Strip the configured URL prefix. `None` when the path is outside it.
fn strip_base(path: &str, base: &str) -> Option<String> {
    if base.is_empty() {
        return Some(path.to_string());
    }
    let rest = path.strip_prefix(base)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

pub(crate) fn parse_query(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes()).into_owned().collect()
}

fn decode_body(headers: &HeaderMap, bytes: &Bytes) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let form: Map<String, Value> = url::form_urlencoded::parse(bytes)
            .into_owned()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        return Value::Object(form);
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn not_found(path: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, "not_found", format!("no route matches {}", path))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "middleware panicked".to_string())
}

/// Fallback handler serving every non-console request.
pub async fn handle(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, state.config.limits.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => return error_response(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", e.to_string()),
    };

    let Some(mut path) = strip_base(parts.uri.path(), &state.config.routing.base) else {
        metrics::record_request("none", parts.method.as_str(), 404, start);
        return not_found(parts.uri.path());
    };
    let mut query = parts.uri.query().map(parse_query).unwrap_or_default();

    if let Some(rewritten) = state.rewriters.rewrite(&path) {
        match rewritten.split_once('?') {
            Some((target, extra)) => {
                query.extend(parse_query(extra));
                path = target.to_string();
            }
            None => path = rewritten,
        }
    }

    let table = state.db.table();
    let Some(matched) = table.match_path(&path) else {
        tracing::debug!(method = %parts.method, path = %path, "No route matched");
        metrics::record_request("none", parts.method.as_str(), 404, start);
        return not_found(&path);
    };

    let route_path = matched.path.clone();
    let method = parts.method.clone();
    tracing::debug!(method = %method, path = %path, route = %route_path, "Matched route");

    let info = RequestInfo {
        body: decode_body(&parts.headers, &bytes),
        method: parts.method,
        uri: parts.uri,
        path,
        headers: parts.headers,
        query,
        params: PathParams::new(),
    };

    let response = run(&state, matched, info).await;
    metrics::record_request(&route_path, method.as_str(), response.status().as_u16(), start);
    response
}

async fn run(state: &AppState, matched: RouteMatch, info: RequestInfo) -> Response {
    let mut ctx = match initializer::initialize(state, matched, info) {
        Ok(ctx) => ctx,
        Err(redirect) => return redirect,
    };

    if !ctx.route.direct_use {
        fetch_stage::run(&state.resolver, &mut ctx).await;
    }

    if let Some(ms) = ctx.route.delay.filter(|ms| *ms > 0) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    let handlers = ctx
        .route
        .middlewares
        .as_deref()
        .map(|list| state.registry.resolve(list))
        .unwrap_or_default();

    for (name, handler) in handlers {
        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&mut ctx))) {
            Ok(Flow::Next) => {}
            Ok(Flow::Respond(response)) => return response,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(route = %ctx.route_path, middleware = %name, error = %message, "Middleware panicked");
                return (StatusCode::INTERNAL_SERVER_ERROR, message).into_response();
            }
        }
    }

    finalizer::finalize(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_base() {
        assert_eq!(strip_base("/users", ""), Some("/users".into()));
        assert_eq!(strip_base("/api/users", "/api"), Some("/users".into()));
        assert_eq!(strip_base("/api", "/api"), Some("/".into()));
        assert_eq!(strip_base("/apix/users", "/api"), None);
        assert_eq!(strip_base("/users", "/api"), None);
    }

    #[test]
    fn test_decode_body() {
        let mut headers = HeaderMap::new();
        assert_eq!(decode_body(&headers, &Bytes::new()), Value::Null);
        assert_eq!(decode_body(&headers, &Bytes::from_static(b"{\"a\":1}")), json!({"a": 1}));
        assert_eq!(decode_body(&headers, &Bytes::from_static(b"plain")), json!("plain"));

        headers.insert(header::CONTENT_TYPE, "application/x-www-form-urlencoded".parse().unwrap());
        assert_eq!(decode_body(&headers, &Bytes::from_static(b"a=1&b=x+y")), json!({"a": "1", "b": "x y"}));
    }

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 1");
    }
}
