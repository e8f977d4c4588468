//! Named middleware lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::MiddlewareRef;
use crate::pipeline::Middleware;
use crate::transforms;

/// Maps middleware names to handlers. Built once at startup.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    handlers: BTreeMap<String, Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in transforms.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        transforms::register_builtins(&mut registry);
        registry
    }

    /// Register a handler; a later registration under the same name wins.
    pub fn register(&mut self, name: impl Into<String>, handler: impl Middleware + 'static) -> &mut Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Middleware>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Handlers for a route's middleware list, in order. Unknown names are skipped.
    pub fn resolve(&self, list: &[MiddlewareRef]) -> Vec<(String, Arc<dyn Middleware>)> {
        list.iter()
            .filter_map(|mw| match mw {
                MiddlewareRef::Inline(inline) => Some((inline.name.clone(), inline.handler.clone())),
                MiddlewareRef::Named(name) => match self.get(name) {
                    Some(handler) => Some((name.clone(), handler)),
                    None => {
                        tracing::warn!(middleware = %name, "Unknown middleware, skipping");
                        None
                    }
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InlineMiddleware;
    use crate::pipeline::{Flow, RequestContext};

    #[test]
    fn test_builtins_registered() {
        let registry = MiddlewareRegistry::with_builtins();
        for name in ["_IterateResponse", "_AdvancedSearch", "_CrudOperation", "_FetchTillData", "_ReadOnly"] {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert!(!registry.contains("_Nope"));
    }

    #[test]
    fn test_resolve_skips_unknown() {
        let mut registry = MiddlewareRegistry::new();
        registry.register("known", |_ctx: &mut RequestContext| Flow::Next);
        let inline = InlineMiddleware::new("inline", |_ctx: &mut RequestContext| Flow::Next);

        let resolved = registry.resolve(&[
            MiddlewareRef::from("known"),
            MiddlewareRef::from("unknown"),
            MiddlewareRef::Inline(inline),
        ]);

        let names: Vec<&str> = resolved.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["known", "inline"]);
    }
}
