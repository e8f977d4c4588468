//! Shared key/value store visible to every route.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};

/// Cross-route scratch store. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<DashMap<String, Value>>,
    initial: Arc<Map<String, Value>>,
}

impl Store {
    /// Create a store seeded with `initial`; [`Store::reset`] returns to it.
    pub fn new(initial: Map<String, Value>) -> Self {
        let inner = DashMap::new();
        for (k, v) in &initial {
            inner.insert(k.clone(), v.clone());
        }
        Self {
            inner: Arc::new(inner),
            initial: Arc::new(initial),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    /// Write a key from a middleware through `RequestContext::store`.
    /// Returns the previous value.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Restore the initial contents.
    pub fn reset(&self) {
        self.inner.clear();
        for (k, v) in self.initial.iter() {
            self.inner.insert(k.clone(), v.clone());
        }
    }

    /// Contents as a JSON object with keys in sorted order.
    pub fn to_json(&self) -> Value {
        let sorted: BTreeMap<String, Value> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        Value::Object(sorted.into_iter().collect())
    }
}
