//! Final stage: commit status, headers and body.

use axum::body::Body;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::Value;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::error_response;
use crate::pipeline::context::{Payload, RequestContext};

/// Headers that would contradict the body we produce.
const STRIPPED_HEADERS: &[&str] = &["content-length", "transfer-encoding", "content-encoding", "connection"];

fn status_of(ctx: &RequestContext) -> Option<StatusCode> {
    let code = ctx.status_code?;
    if !(100..600).contains(&code) {
        tracing::warn!(route = %ctx.route_path, status = code, "Ignoring out-of-range status code");
        return None;
    }
    StatusCode::from_u16(code).ok()
}

fn header_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub async fn finalize(ctx: RequestContext) -> Response {
    let status = status_of(&ctx);

    let mut response = match &ctx.data {
        Payload::Empty => Response::new(Body::empty()),
        Payload::Json(Value::String(text)) => {
            let mut response = Response::new(Body::from(ctx.template().render(text)));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
            response
        }
        Payload::Json(value) => match serde_json::to_vec(value) {
            Ok(bytes) => {
                let mut response = Response::new(Body::from(bytes));
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
            Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string()),
        },
        Payload::Binary { bytes, content_type } => {
            let mut response = Response::new(Body::from(bytes.clone()));
            if let Ok(value) = HeaderValue::from_str(content_type) {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            response
        }
        Payload::File(path) => {
            let request = Request::new(Body::empty());
            match ServeFile::new(path).oneshot(request).await {
                Ok(response) => response.map(Body::new),
                Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string()),
            }
        }
    };

    if let Some(status) = status {
        *response.status_mut() = status;
    }

    let headers = response.headers_mut();
    for (name, value) in &ctx.headers {
        if STRIPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&header_text(value)),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::debug!(route = %ctx.route_path, header = %name, "Skipping invalid header"),
        }
    }

    if ctx.config.routing.no_cache {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RouteDefinition;
    use crate::pipeline::context::testing::context;
    use axum::http::Method;
    use serde_json::json;

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_json_with_status() {
        let route = RouteDefinition {
            mock: Some(json!({"id": "1"})),
            status_code: Some(500),
            ..RouteDefinition::default()
        };
        let response = finalize(context(Method::GET, route, &[], Value::Null)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache, no-store, must-revalidate");
        assert_eq!(body_text(response).await, r#"{"id":"1"}"#);
    }

    #[tokio::test]
    async fn test_invalid_status_ignored() {
        let route = RouteDefinition {
            mock: Some(json!(1)),
            status_code: Some(700),
            ..RouteDefinition::default()
        };
        let response = finalize(context(Method::GET, route, &[], Value::Null)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_string_is_templated() {
        let route = RouteDefinition::from_mock(json!("port ${config.port}, q=${req.query.q}"));
        let response = finalize(context(Method::GET, route, &[("q", "x")], Value::Null)).await;
        assert_eq!(body_text(response).await, "port 3000, q=x");
    }

    #[tokio::test]
    async fn test_conflicting_headers_stripped() {
        let mut headers = serde_json::Map::new();
        headers.insert("Content-Length".into(), json!("999"));
        headers.insert("Transfer-Encoding".into(), json!("chunked"));
        headers.insert("x-custom".into(), json!(7));
        let route = RouteDefinition {
            mock: Some(json!([])),
            headers: Some(headers),
            ..RouteDefinition::default()
        };
        let response = finalize(context(Method::GET, route, &[], Value::Null)).await;
        assert_eq!(response.headers()["x-custom"], "7");
        assert!(response.headers().get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(body_text(response).await, "[]");
    }

    #[tokio::test]
    async fn test_file_streamed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.bin");
        std::fs::write(&path, b"raw bytes").unwrap();

        let mut ctx = context(Method::GET, RouteDefinition::default(), &[], Value::Null);
        ctx.data = Payload::File(path);
        let response = finalize(ctx).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "raw bytes");
    }
}
