//! Per-request state threaded through the pipeline stages.

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{HeaderMap, Method, Uri};
use bytes::Bytes;
use serde_json::{json, Map, Value};

use crate::config::ServerConfig;
use crate::db::{FetchData, RouteDefinition, RouteSlot};
use crate::routing::PathParams;
use crate::store::Store;
use crate::template::TemplateContext;

/// The response body being built.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Nothing to send.
    Empty,
    Json(Value),
    Binary { bytes: Bytes, content_type: String },
    /// A local file streamed as-is.
    File(PathBuf),
}

impl Payload {
    pub fn from_mock(mock: Option<&Value>) -> Self {
        mock.cloned().map_or(Payload::Empty, Payload::Json)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// The incoming request, decoded once.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    /// Path after base stripping and rewriting.
    pub path: String,
    pub headers: HeaderMap,
    /// Decoded query pairs, repeated keys kept.
    pub query: Vec<(String, String)>,
    pub body: Value,
    pub params: PathParams,
}

impl RequestInfo {
    /// Query pairs as an object; repeated keys become arrays.
    pub fn query_object(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in &self.query {
            match out.get_mut(key) {
                Some(Value::Array(items)) => items.push(Value::String(value.clone())),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, Value::String(value.clone())]);
                }
                None => {
                    out.insert(key.clone(), Value::String(value.clone()));
                }
            }
        }
        out
    }

    /// The `req` root bound for `${req.*}` placeholders.
    pub fn template_view(&self) -> Value {
        let headers: Map<String, Value> = self
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), Value::String(v.to_string()))))
            .collect();
        json!({
            "method": self.method.as_str(),
            "url": self.uri.to_string(),
            "path": self.path,
            "params": self.params,
            "query": self.query_object(),
            "headers": headers,
            "body": self.body,
        })
    }
}

/// Mutable state for one request.
pub struct RequestContext {
    pub request: RequestInfo,
    /// Route pattern that matched.
    pub route_path: String,
    pub slot: Arc<RouteSlot>,
    /// Copy of the route definition, refreshed after every write to the slot.
    pub route: RouteDefinition,
    pub data: Payload,
    pub status_code: Option<u16>,
    pub headers: Map<String, Value>,
    /// Outcome of the fetch stage for this request, if it ran.
    pub fetch_data: Option<FetchData>,
    pub store: Store,
    pub config: Arc<ServerConfig>,
}

impl RequestContext {
    pub fn new(
        request: RequestInfo,
        route_path: String,
        slot: Arc<RouteSlot>,
        store: Store,
        config: Arc<ServerConfig>,
    ) -> Self {
        let route = slot.read();
        Self {
            data: Payload::from_mock(route.mock.as_ref()),
            status_code: route.status_code,
            headers: route.headers.clone().unwrap_or_default(),
            request,
            route_path,
            slot,
            route,
            fetch_data: None,
            store,
            config,
        }
    }

    /// Mutate the live route definition and refresh the local copy.
    pub fn with_route<R>(&mut self, f: impl FnOnce(&mut RouteDefinition) -> R) -> R {
        let (result, route) = self.slot.update(|r| {
            let result = f(r);
            (result, r.clone())
        });
        self.route = route;
        result
    }

    pub fn reload_route(&mut self) {
        self.route = self.slot.read();
    }

    /// Placeholder bindings for this request.
    pub fn template(&self) -> TemplateContext {
        TemplateContext::new(self.request.template_view(), self.config.template_view())
    }

    pub fn id_field(&self) -> &str {
        &self.config.routing.id_field
    }

    pub fn set_json(&mut self, value: Value) {
        self.data = Payload::Json(value);
    }
}
