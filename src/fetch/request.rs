//! Fetch target preparation and remote calls.

use std::path::{Path, PathBuf};

use axum::http::Method;
use serde_json::{Map, Value};

use crate::db::{FetchData, FetchSpec};
use crate::fetch::FetchError;
use crate::template::TemplateContext;

/// A fully substituted remote request.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// Where a fetch goes.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchTarget {
    Remote(RemoteRequest),
    File(PathBuf),
}

fn is_url(target: &str) -> bool {
    target.starts_with("http")
}

fn pairs(map: &Map<String, Value>, tpl: &TemplateContext) -> Vec<(String, String)> {
    map.iter()
        .map(|(k, v)| {
            let value = match tpl.render_value(v) {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

/// Substitute placeholders and classify the fetch as remote or local.
pub fn prepare(spec: &FetchSpec, tpl: &TemplateContext, root: &Path) -> Result<FetchTarget, FetchError> {
    let target = tpl.render(spec.target().trim());

    if !is_url(&target) {
        let path = Path::new(&target);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        return Ok(FetchTarget::File(path));
    }

    let request = match spec {
        FetchSpec::Url(_) => RemoteRequest {
            method: Method::GET,
            url: target,
            headers: Vec::new(),
            params: Vec::new(),
            body: None,
        },
        FetchSpec::Request(req) => {
            let method = match req.method.as_deref() {
                Some(m) => Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                    .map_err(|_| FetchError::Invalid(format!("unknown method '{}'", m)))?,
                None => Method::GET,
            };
            RemoteRequest {
                method,
                url: target,
                headers: pairs(&req.headers, tpl),
                params: pairs(&req.params, tpl),
                body: req.body.as_ref().map(|b| tpl.render_value(b)),
            }
        }
    };
    Ok(FetchTarget::Remote(request))
}

/// Perform a remote request and classify the outcome. Never fails: transport
/// errors and 4xx/5xx responses become error `FetchData`.
pub async fn send(client: &reqwest::Client, request: RemoteRequest) -> FetchData {
    let mut builder = client
        .request(request.method.clone(), &request.url)
        .query(&request.params);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder = match request.body {
        Some(Value::String(text)) => builder.body(text),
        Some(Value::Null) | None => builder,
        Some(body) => builder.json(&body),
    };

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => {
            let err = FetchError::from(e);
            return FetchData::error(err.status_code(), err.to_string());
        }
    };

    let status = response.status();
    let headers: Map<String, Value> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = FetchError::from(e);
            return FetchData::error(err.status_code(), err.to_string());
        }
    };

    let is_image = content_type.starts_with("image/");
    let body = if is_image {
        Value::Null
    } else if content_type.contains("json") {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    } else {
        Value::String(String::from_utf8_lossy(&bytes).into_owned())
    };

    let is_error = status.is_client_error() || status.is_server_error();
    FetchData {
        is_error,
        response: body,
        status_code: status.as_u16(),
        headers,
        message: is_error.then(|| status.canonical_reason().unwrap_or("Upstream error").to_string()),
        is_image,
        binary: is_image.then_some(bytes),
    }
}
