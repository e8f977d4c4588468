//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled route patterns in declaration order
//! - Look up the matching route for a request path
//! - Return the matched route or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction; edits build a new table
//! - O(n) ordered scan, first match wins
//! - Entries share their [`RouteSlot`] with older tables, so per-route state
//!   survives a table rebuild

use std::sync::Arc;

use crate::db::{RouteDefinition, RouteMap, RouteSlot};
use crate::routing::matcher::{PathParams, PathPattern};

/// One compiled route.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub path: String,
    pub pattern: PathPattern,
    pub slot: Arc<RouteSlot>,
}

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub path: String,
    pub pattern: PathPattern,
    pub params: PathParams,
    pub slot: Arc<RouteSlot>,
}

/// Ordered, compiled route table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Compile a route map into fresh slots.
    pub fn from_map(map: RouteMap) -> Self {
        let entries = map
            .into_iter()
            .map(|(path, route)| RouteEntry {
                pattern: PathPattern::parse(&path),
                path,
                slot: Arc::new(RouteSlot::new(route)),
            })
            .collect();
        Self { entries }
    }

    /// Find the first route matching a request path.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
        self.entries.iter().find_map(|entry| {
            entry.pattern.matches(path).map(|params| RouteMatch {
                path: entry.path.clone(),
                pattern: entry.pattern.clone(),
                params,
                slot: entry.slot.clone(),
            })
        })
    }

    pub fn get(&self, path: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.slot.read().id == id)
    }

    /// A new table with `map` merged in: existing paths get a fresh slot in
    /// place, new paths are appended.
    pub fn with_routes(&self, map: RouteMap) -> Self {
        let mut entries = self.entries.clone();
        for (path, route) in map {
            let slot = Arc::new(RouteSlot::new(route));
            match entries.iter_mut().find(|e| e.path == path) {
                Some(entry) => entry.slot = slot,
                None => entries.push(RouteEntry {
                    pattern: PathPattern::parse(&path),
                    path,
                    slot,
                }),
            }
        }
        Self { entries }
    }

    /// Current definitions, including runtime state.
    pub fn snapshot(&self) -> RouteMap {
        self.entries
            .iter()
            .map(|e| (e.path.clone(), e.slot.read()))
            .collect()
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RouteEntry {
    pub fn definition(&self) -> RouteDefinition {
        self.slot.read()
    }
}
