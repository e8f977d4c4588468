//! Startup orchestration.
//!
//! # Responsibilities
//! - Read the db, injector, rewriter and store files named in the config
//! - Normalize, inject and check the route map against the registry
//! - Assemble the `AppState` the HTTP server runs on
//!
//! # Design Decisions
//! - At startup a broken data file is logged and replaced by an empty default
//! - On hot reload the same files are strict: any error keeps the current map
//! - Unknown middleware names are logged and dropped from their routes

use std::path::Path;

use serde_json::{Map, Value};

use crate::config::loader::{load_json_file, load_json_object};
use crate::config::validation::{validate_middlewares, ValidationError};
use crate::config::{ConfigError, ServerConfig};
use crate::db::{
    apply_injectors, normalize_json_db, parse_injectors, InjectorRule, MiddlewareRef, NormalizeOptions,
    RouteMap,
};
use crate::error::Error;
use crate::http::AppState;
use crate::pipeline::MiddlewareRegistry;
use crate::routing::Rewriters;
use crate::store::Store;

fn normalize_options(config: &ServerConfig) -> NormalizeOptions {
    NormalizeOptions {
        reverse: config.routing.reverse,
    }
}

/// Read the db file into a normalized map. No db path means no routes.
pub fn load_db(config: &ServerConfig) -> Result<RouteMap, ConfigError> {
    let Some(path) = &config.data.db_path else {
        return Ok(RouteMap::new());
    };
    let raw = load_json_object(&config.resolve_path(path))?;
    Ok(normalize_json_db(Value::Object(raw), normalize_options(config)))
}

pub fn load_injectors(config: &ServerConfig) -> Result<Vec<InjectorRule>, ConfigError> {
    match &config.data.injectors_path {
        Some(path) => Ok(parse_injectors(load_json_file(&config.resolve_path(path))?)),
        None => Ok(Vec::new()),
    }
}

/// Read an optional JSON object file, e.g. rewriters or the initial store.
pub fn load_object(config: &ServerConfig, path: Option<&Path>) -> Result<Map<String, Value>, ConfigError> {
    match path {
        Some(path) => load_json_object(&config.resolve_path(path)),
        None => Ok(Map::new()),
    }
}

/// Build the route map from disk, failing on any file or middleware error.
///
/// Used by the hot-reload watcher, where a bad edit must not replace the
/// running routes.
pub fn load_route_map(config: &ServerConfig, registry: &MiddlewareRegistry) -> Result<RouteMap, ConfigError> {
    let mut map = load_db(config)?;
    let injectors = load_injectors(config)?;
    apply_injectors(&mut map, &injectors);

    let errors = validate_middlewares(&map, registry);
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors));
    }
    strip_sentinels(&mut map);
    Ok(map)
}

fn strip_sentinels(map: &mut RouteMap) {
    for (_, route) in map.iter_mut() {
        if let Some(list) = route.middlewares.as_mut() {
            list.retain(|mw| !mw.is_sentinel());
        }
    }
}

/// Drop middleware names the registry does not know, returning what was dropped.
pub fn prune_unknown_middlewares(map: &mut RouteMap, registry: &MiddlewareRegistry) -> Vec<ValidationError> {
    let errors = validate_middlewares(map, registry);
    for error in &errors {
        tracing::error!(error = %error, "Removing unknown middleware");
    }
    for (_, route) in map.iter_mut() {
        if let Some(list) = route.middlewares.as_mut() {
            list.retain(|mw| !mw.is_sentinel() && is_known(mw, registry));
        }
    }
    errors
}

fn is_known(mw: &MiddlewareRef, registry: &MiddlewareRegistry) -> bool {
    match mw {
        MiddlewareRef::Named(name) => registry.contains(name),
        MiddlewareRef::Inline(_) => true,
    }
}

fn or_default<T: Default>(what: &str, result: Result<T, ConfigError>) -> T {
    result.unwrap_or_else(|e| {
        tracing::error!(file = what, error = %e, "Failed to load data file, using an empty default");
        T::default()
    })
}

/// Assemble application state from the config and its data files.
pub fn build_state(config: ServerConfig, registry: MiddlewareRegistry) -> Result<AppState, Error> {
    let mut map = or_default("db", load_db(&config));
    let injectors = or_default("injectors", load_injectors(&config));
    apply_injectors(&mut map, &injectors);
    prune_unknown_middlewares(&mut map, &registry);

    let rewriters = or_default(
        "rewriters",
        load_object(&config, config.data.rewriters_path.as_deref()),
    );
    let store = or_default("store", load_object(&config, config.data.store_path.as_deref()));

    tracing::info!(
        routes = map.len(),
        injectors = injectors.len(),
        rewriters = rewriters.len(),
        store_keys = store.len(),
        "Route map loaded"
    );

    Ok(AppState::new(config, map, registry)?
        .with_store(Store::new(store))
        .with_rewriters(Rewriters::from_json(rewriters))
        .with_injectors(injectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &Path, name: &str, value: Value) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        path
    }

    fn config_in(dir: &Path) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.data.root = dir.to_path_buf();
        config
    }

    fn names(map: &RouteMap, path: &str) -> Vec<String> {
        map.get(path)
            .and_then(|r| r.middlewares.clone())
            .unwrap_or_default()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    #[test]
    fn test_load_route_map_applies_injectors() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.data.db_path = Some(write(dir.path(), "db.json", json!({"/users": [{"id": 1}]})));
        config.data.injectors_path = Some(write(
            dir.path(),
            "injectors.json",
            json!([{"routes": "/users", "delay": 20, "middlewares": ["_CrudOperation"]}]),
        ));

        let map = load_route_map(&config, &MiddlewareRegistry::with_builtins()).unwrap();
        let route = map.get("/users").unwrap();
        assert_eq!(route.delay, Some(20));
        assert_eq!(names(&map, "/users"), vec!["_CrudOperation"]);
    }

    #[test]
    fn test_load_route_map_rejects_unknown_middleware() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.data.db_path = Some(write(
            dir.path(),
            "db.json",
            json!({"/a": {"_config": true, "mock": 1, "middlewares": ["nope"]}}),
        ));

        let err = load_route_map(&config, &MiddlewareRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(errors) if errors.len() == 1));
    }

    #[test]
    fn test_prune_keeps_known_and_drops_sentinel() {
        let mut map = normalize_json_db(
            json!({"/a": {"_config": true, "mock": 1, "middlewares": ["...", "_MockOnly", "nope"]}}),
            NormalizeOptions::default(),
        );
        let dropped = prune_unknown_middlewares(&mut map, &MiddlewareRegistry::with_builtins());
        assert_eq!(dropped.len(), 1);
        assert_eq!(names(&map, "/a"), vec!["_MockOnly"]);
        assert!(!map.get("/a").unwrap().middlewares.as_ref().unwrap().contains(&MiddlewareRef::from("...")));
    }

    #[test]
    fn test_build_state_degrades_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.data.db_path = Some("missing.json".into());
        config.data.store_path = Some(write(dir.path(), "store.json", json!({"token": "abc"})));

        let state = build_state(config, MiddlewareRegistry::with_builtins()).unwrap();
        assert!(state.db.table().is_empty());
        assert_eq!(state.store.get("token"), Some(json!("abc")));
    }
}
