//! Route map normalization.
//!
//! # Responsibilities
//! - Turn arbitrary user input per route key into a canonical [`RouteDefinition`]
//! - Normalize route paths (leading slash, no trailing slash)
//! - Expand comma-joined keys into independent routes
//! - Assign a stable id to every route
//!
//! # Design Decisions
//! - Malformed definitions degrade to a mock-only definition rather than failing
//! - Colliding paths: the later declaration replaces the earlier one whole
//! - Ids are derived from the route path (UUID v5), so re-normalizing is stable

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::db::route::{InlineMiddleware, MiddlewareRef, RouteDefinition, RouteMap};

/// One user-supplied route value.
#[derive(Debug, Clone)]
pub enum RouteValue {
    /// A literal or `{ "_config": true, ... }` object.
    Json(Value),
    /// A handler used directly as the route's middleware.
    Handler(InlineMiddleware),
}

impl From<Value> for RouteValue {
    fn from(value: Value) -> Self {
        RouteValue::Json(value)
    }
}

/// Normalization switches taken from the routing config.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Process declarations last-to-first so earlier ones win.
    pub reverse: bool,
}

/// Normalize a route path: single leading slash, no trailing or repeated slashes.
pub fn normalize_route_path(raw: &str) -> String {
    let segments: Vec<&str> = raw.trim().split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Deterministic id for a route path.
pub fn route_id(path: &str) -> String {
    let uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, path.as_bytes());
    uuid.simple().to_string()[..12].to_string()
}

/// Split a possibly comma-joined key into normalized route paths.
pub fn split_route_key(key: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for part in key.split(',') {
        if part.trim().is_empty() {
            continue;
        }
        let path = normalize_route_path(part);
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        paths.push("/".to_string());
    }
    paths
}

/// Canonical definition for a single value, without an id.
pub fn normalize_value(path: &str, value: RouteValue) -> RouteDefinition {
    match value {
        RouteValue::Handler(handler) => RouteDefinition {
            direct_use: true,
            middlewares: Some(vec![MiddlewareRef::Inline(handler)]),
            ..RouteDefinition::default()
        },
        RouteValue::Json(Value::Object(obj)) if is_config_object(&obj) => {
            let fallback_mock = obj.get("mock").cloned();
            let fallback_id = obj.get("id").and_then(Value::as_str).map(str::to_string);
            match serde_json::from_value::<RouteDefinition>(Value::Object(obj)) {
                Ok(mut route) => {
                    route.config = true;
                    route
                }
                Err(e) => {
                    tracing::warn!(route = %path, error = %e, "Malformed route definition, serving its mock only");
                    RouteDefinition {
                        id: fallback_id.unwrap_or_default(),
                        mock: fallback_mock,
                        ..RouteDefinition::default()
                    }
                }
            }
        }
        RouteValue::Json(value) => RouteDefinition::from_mock(value),
    }
}

fn is_config_object(obj: &Map<String, Value>) -> bool {
    obj.get("_config").and_then(Value::as_bool).unwrap_or(false)
}

/// Normalize ordered user input into a route map.
pub fn normalize_db<I>(input: I, options: NormalizeOptions) -> RouteMap
where
    I: IntoIterator<Item = (String, RouteValue)>,
{
    let mut entries: Vec<(String, RouteValue)> = input.into_iter().collect();
    if options.reverse {
        entries.reverse();
    }

    let mut map = RouteMap::new();
    for (key, value) in entries {
        let paths = split_route_key(&key);
        let split = paths.len() > 1;
        let route = normalize_value(&key, value);

        for path in paths {
            let mut route = route.clone();
            if split || route.id.is_empty() {
                route.id = route_id(&path);
            }
            if map.insert(path.clone(), route).is_some() {
                tracing::debug!(route = %path, "Route declared more than once, later declaration wins");
            }
        }
    }
    map
}

/// Normalize a JSON route map document. A non-object degrades to an empty map.
pub fn normalize_json_db(value: Value, options: NormalizeOptions) -> RouteMap {
    match value {
        Value::Object(obj) => normalize_db(
            obj.into_iter().map(|(k, v)| (k, RouteValue::Json(v))),
            options,
        ),
        Value::Null => RouteMap::new(),
        other => {
            tracing::warn!(kind = %json_kind(&other), "Route map must be a JSON object, using an empty map");
            RouteMap::new()
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
