//! Route map subsystem.
//!
//! # Data Flow
//! ```text
//! user input (JSON object / handlers)
//!     → normalize.rs (canonical definitions, split keys, ids)
//!     → injector.rs (pattern-matched overrides)
//!     → Db (original snapshot + live RouteTable)
//!
//! Per request:
//!     RouteSlot ← fetch stage writes fetchData / fetchCount
//!               ← transforms write the route-local store
//!
//! Console:
//!     reset      → live table rebuilt from the original snapshot
//!     add/update → new table swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Per-route state sits behind a short-lived std mutex, never held across await
//! - Fetch decisions are serialized per route by an async gate (single flight)
//! - Table swaps use arc-swap; readers never block

pub mod injector;
pub mod normalize;
pub mod route;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::routing::RouteTable;

pub use injector::{apply_injectors, parse_injectors, InjectorRule};
pub use normalize::{normalize_db, normalize_json_db, normalize_route_path, NormalizeOptions, RouteValue};
pub use route::{
    FetchData, FetchRequest, FetchSpec, InlineMiddleware, MiddlewareRef, RouteDefinition, RouteMap,
};

/// Mutable state of one live route.
#[derive(Debug)]
pub struct RouteSlot {
    route: Mutex<RouteDefinition>,
    fetch_gate: tokio::sync::Mutex<()>,
}

impl RouteSlot {
    pub fn new(route: RouteDefinition) -> Self {
        Self {
            route: Mutex::new(route),
            fetch_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouteDefinition> {
        self.route.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current definition.
    pub fn read(&self) -> RouteDefinition {
        self.lock().clone()
    }

    /// Mutate the definition in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut RouteDefinition) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn replace(&self, route: RouteDefinition) -> RouteDefinition {
        std::mem::replace(&mut *self.lock(), route)
    }

    /// Serializes fetch decisions and I/O for this route.
    pub fn fetch_gate(&self) -> &tokio::sync::Mutex<()> {
        &self.fetch_gate
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("no route with id '{0}'")]
    NotFound(String),
    #[error("invalid route definition: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// The live route map plus the snapshot it resets to.
pub struct Db {
    live: ArcSwap<RouteTable>,
    original: ArcSwap<RouteMap>,
}

impl Db {
    pub fn new(map: RouteMap) -> Self {
        Self {
            live: ArcSwap::from_pointee(RouteTable::from_map(map.clone())),
            original: ArcSwap::from_pointee(map),
        }
    }

    /// The current route table.
    pub fn table(&self) -> Arc<RouteTable> {
        self.live.load_full()
    }

    /// Live definitions including runtime state.
    pub fn snapshot(&self) -> RouteMap {
        self.live.load().snapshot()
    }

    /// Replace both the live table and the reset snapshot (hot reload).
    pub fn replace(&self, map: RouteMap) {
        self.live.store(Arc::new(RouteTable::from_map(map.clone())));
        self.original.store(Arc::new(map));
    }

    /// Discard every runtime mutation and added route.
    pub fn reset(&self) {
        let original = self.original.load_full();
        self.live.store(Arc::new(RouteTable::from_map(RouteMap::clone(&original))));
    }

    /// Restore one route to its originally normalized definition.
    pub fn reset_route(&self, id: &str) -> Result<(String, RouteDefinition), DbError> {
        let table = self.table();
        let entry = table
            .find_by_id(id)
            .ok_or_else(|| DbError::NotFound(id.to_string()))?;
        let original = self.original.load();
        let route = original
            .get(&entry.path)
            .cloned()
            .ok_or_else(|| DbError::NotFound(id.to_string()))?;
        entry.slot.replace(route.clone());
        Ok((entry.path.clone(), route))
    }

    /// Add or replace routes in the live table. Later wins on collision.
    pub fn add(&self, map: RouteMap) {
        self.live.rcu(|table| table.with_routes(map.clone()));
    }

    /// Overwrite top-level fields of one route. The id is kept; a changed
    /// `fetch` discards the cached fetch outcome and transform caches.
    pub fn update_route(&self, id: &str, patch: Map<String, Value>) -> Result<(String, RouteDefinition), DbError> {
        let table = self.table();
        let entry = table
            .find_by_id(id)
            .ok_or_else(|| DbError::NotFound(id.to_string()))?;

        let current = entry.slot.read();
        let mut merged = match serde_json::to_value(&current)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            merged.insert(key, value);
        }
        let mut updated: RouteDefinition = serde_json::from_value(Value::Object(merged))?;
        updated.id = current.id.clone();
        updated.direct_use = current.direct_use;
        if let (Some(before), Some(after)) = (&current.middlewares, updated.middlewares.as_mut()) {
            // keep inline handlers the JSON form cannot carry
            for mw in after.iter_mut() {
                if let Some(inline) = before
                    .iter()
                    .find(|b| matches!(b, MiddlewareRef::Inline(_)) && b.name() == mw.name())
                {
                    *mw = inline.clone();
                }
            }
        }
        if updated.fetch != current.fetch {
            updated.fetch_data = None;
            updated.clear_transform_caches();
        }

        entry.slot.replace(updated.clone());
        Ok((entry.path.clone(), updated))
    }
}
