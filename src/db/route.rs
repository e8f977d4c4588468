//! Route definition data model.
//!
//! A [`RouteDefinition`] describes how one route path responds. Definitions are
//! kept in a [`RouteMap`], an ordered map keyed by normalized route path.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::pipeline::Middleware;
use crate::transforms;

/// Middleware list entry that expands to the existing list during injection.
pub const MIDDLEWARE_SENTINEL: &str = "...";

/// The `fetch` field: a URL or file path, or a structured request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FetchSpec {
    Url(String),
    Request(FetchRequest),
}

impl FetchSpec {
    /// URL or file path this fetch targets (before template substitution).
    pub fn target(&self) -> &str {
        match self {
            FetchSpec::Url(url) => url,
            FetchSpec::Request(req) => &req.url,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.target().trim().is_empty()
    }
}

/// Structured fetch descriptor. String fields accept `${...}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    #[serde(alias = "data", skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Last resolved fetch outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchData {
    pub is_error: bool,
    #[serde(default)]
    pub response: Value,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_image: bool,
    /// Raw body for binary responses; not part of the exported route map.
    #[serde(skip)]
    pub binary: Option<Bytes>,
}

impl FetchData {
    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            is_error: true,
            response: Value::String(message.clone()),
            status_code,
            headers: Map::new(),
            message: Some(message),
            is_image: false,
            binary: None,
        }
    }
}

/// A handler supplied in code rather than by name.
#[derive(Clone)]
pub struct InlineMiddleware {
    pub name: String,
    pub handler: Arc<dyn Middleware>,
}

impl InlineMiddleware {
    pub fn new(name: impl Into<String>, handler: impl Middleware + 'static) -> Self {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for InlineMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineMiddleware")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A transform reference in a route's middleware list.
#[derive(Debug, Clone)]
pub enum MiddlewareRef {
    Named(String),
    Inline(InlineMiddleware),
}

impl MiddlewareRef {
    pub fn name(&self) -> &str {
        match self {
            MiddlewareRef::Named(name) => name,
            MiddlewareRef::Inline(inline) => &inline.name,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, MiddlewareRef::Named(name) if name == MIDDLEWARE_SENTINEL)
    }
}

impl PartialEq for MiddlewareRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MiddlewareRef::Named(a), MiddlewareRef::Named(b)) => a == b,
            (MiddlewareRef::Inline(a), MiddlewareRef::Inline(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(&a.handler), Arc::as_ptr(&b.handler))
            }
            _ => false,
        }
    }
}

impl From<&str> for MiddlewareRef {
    fn from(name: &str) -> Self {
        MiddlewareRef::Named(name.to_string())
    }
}

impl Serialize for MiddlewareRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for MiddlewareRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(MiddlewareRef::Named)
    }
}

/// Remove repeated references, keeping the first occurrence.
pub fn dedup_middlewares(list: Vec<MiddlewareRef>) -> Vec<MiddlewareRef> {
    let mut out: Vec<MiddlewareRef> = Vec::with_capacity(list.len());
    for mw in list {
        if !out.contains(&mw) {
            out.push(mw);
        }
    }
    out
}

fn config_marker() -> bool {
    true
}

// Keeps an explicit `null` mock distinct from an absent one.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Configuration describing how one route path responds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDefinition {
    #[serde(rename = "_config", default = "config_marker")]
    pub config: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub mock: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_data: Option<FetchData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_fetch_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_first: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middlewares: Option<Vec<MiddlewareRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<Map<String, Value>>,
    /// Handler-backed route: skips the fetch stage and runs its middlewares directly.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub direct_use: bool,
    /// Unrecognised fields are carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for RouteDefinition {
    fn default() -> Self {
        Self {
            config: true,
            id: String::new(),
            description: None,
            mock: None,
            fetch: None,
            fetch_data: None,
            fetch_count: None,
            skip_fetch_error: None,
            mock_first: None,
            status_code: None,
            delay: None,
            headers: None,
            middlewares: None,
            store: None,
            direct_use: false,
            extra: Map::new(),
        }
    }
}

impl RouteDefinition {
    /// Shorthand form: the whole value is served verbatim.
    pub fn from_mock(mock: Value) -> Self {
        Self {
            mock: Some(mock),
            ..Self::default()
        }
    }

    /// Whether the route has a non-empty `fetch` field.
    pub fn has_fetch(&self) -> bool {
        self.fetch.as_ref().is_some_and(|f| !f.is_empty())
    }

    /// Remaining fetch budget. A fetch-capable route without one fetches once.
    pub fn effective_fetch_count(&self) -> i64 {
        self.fetch_count.unwrap_or(1)
    }

    pub fn is_mock_first(&self) -> bool {
        self.mock_first.unwrap_or(false)
    }

    pub fn skips_fetch_error(&self) -> bool {
        self.skip_fetch_error.unwrap_or(false)
    }

    /// Drop transform caches that are stale once fresh data arrives.
    pub fn clear_transform_caches(&mut self) {
        if let Some(store) = self.store.as_mut() {
            for key in transforms::CACHE_KEYS {
                store.remove(*key);
            }
        }
    }

    /// Route-local store, created on first use.
    pub fn store_mut(&mut self) -> &mut Map<String, Value> {
        self.store.get_or_insert_with(Map::new)
    }

    /// JSON form without runtime state; definitions carrying only `mock` collapse to it.
    pub fn to_clean_json(&self) -> Value {
        let mut value = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => return Value::Null,
        };
        for key in ["_config", "id", "fetchData", "store"] {
            value.remove(key);
        }
        if value.len() == 1 && value.contains_key("mock") {
            return value.remove("mock").unwrap_or(Value::Null);
        }
        Value::Object(value)
    }
}

/// Ordered mapping from normalized route path to definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteMap {
    entries: Vec<(String, RouteDefinition)>,
}

impl RouteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition. An existing path keeps its position and the
    /// previous definition is returned whole.
    pub fn insert(&mut self, path: impl Into<String>, route: RouteDefinition) -> Option<RouteDefinition> {
        let path = path.into();
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            Some((_, existing)) => Some(std::mem::replace(existing, route)),
            None => {
                self.entries.push((path, route));
                None
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&RouteDefinition> {
        self.entries.iter().find(|(p, _)| p == path).map(|(_, r)| r)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut RouteDefinition> {
        self.entries.iter_mut().find(|(p, _)| p == path).map(|(_, r)| r)
    }

    pub fn find_by_id(&self, id: &str) -> Option<(&String, &RouteDefinition)> {
        self.entries
            .iter()
            .find(|(_, r)| r.id == id)
            .map(|(p, r)| (p, r))
    }

    pub fn remove(&mut self, path: &str) -> Option<RouteDefinition> {
        let index = self.entries.iter().position(|(p, _)| p == path)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RouteDefinition)> {
        self.entries.iter().map(|(p, r)| (p, r))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut RouteDefinition)> {
        self.entries.iter_mut().map(|(p, r)| (&*p, r))
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().map(|(p, _)| p)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Export as a JSON object, optionally in the clean shorthand form.
    pub fn to_json(&self, clean: bool) -> Value {
        let map = self
            .entries
            .iter()
            .map(|(path, route)| {
                let value = if clean {
                    route.to_clean_json()
                } else {
                    serde_json::to_value(route).unwrap_or(Value::Null)
                };
                (path.clone(), value)
            })
            .collect();
        Value::Object(map)
    }
}

impl IntoIterator for RouteMap {
    type Item = (String, RouteDefinition);
    type IntoIter = std::vec::IntoIter<(String, RouteDefinition)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, RouteDefinition)> for RouteMap {
    fn from_iter<I: IntoIterator<Item = (String, RouteDefinition)>>(iter: I) -> Self {
        let mut map = RouteMap::new();
        for (path, route) in iter {
            map.insert(path, route);
        }
        map
    }
}

impl Serialize for RouteMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (path, route) in &self.entries {
            map.serialize_entry(path, route)?;
        }
        map.end()
    }
}
