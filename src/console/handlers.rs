use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{Map, Value};

use crate::config::validation::{validate_middlewares, ValidationError};
use crate::console::ConsoleError;
use crate::db::{apply_injectors, normalize_json_db, MiddlewareRef, NormalizeOptions, RouteDefinition};
use crate::http::AppState;
use crate::observability::metrics;
use crate::template;

/// `{ "<path>": <definition> }`, the same shape as one `/_db` entry.
fn route_entry(path: &str, route: &RouteDefinition) -> Value {
    let mut entry = Map::new();
    entry.insert(path.to_string(), serde_json::to_value(route).unwrap_or(Value::Null));
    Value::Object(entry)
}

fn is_true(params: &HashMap<String, String>, key: &str) -> bool {
    params.get(key).is_some_and(|v| v.is_empty() || v == "true")
}

pub async fn get_db(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    Json(state.db.snapshot().to_json(is_true(&params, "_clean")))
}

pub async fn get_route(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ConsoleError> {
    let table = state.db.table();
    let entry = table.find_by_id(&id).ok_or(ConsoleError::NotFound(id))?;
    Ok(Json(route_entry(&entry.path, &entry.definition())))
}

/// Add routes: normalized, injected, and checked against the registry.
pub async fn add_routes(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ConsoleError> {
    if !body.is_object() {
        return Err(ConsoleError::BadRequest("expected an object of routes".into()));
    }
    let options = NormalizeOptions {
        reverse: state.config.routing.reverse,
    };
    let mut map = normalize_json_db(body, options);
    apply_injectors(&mut map, &state.injectors);

    let errors = validate_middlewares(&map, &state.registry);
    if !errors.is_empty() {
        return Err(ConsoleError::Invalid(errors));
    }

    let added = map.to_json(false);
    tracing::info!(routes = ?map.paths().collect::<Vec<_>>(), "Routes added from console");
    state.db.add(map);
    metrics::record_route_count(state.db.table().len());
    Ok((StatusCode::CREATED, Json(added)))
}

/// Overwrite top-level fields of one route.
pub async fn update_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<Json<Value>, ConsoleError> {
    if let Some(list) = patch.get("middlewares").filter(|v| !v.is_null()) {
        let list: Vec<MiddlewareRef> = serde_json::from_value(list.clone())
            .map_err(|e| ConsoleError::BadRequest(format!("middlewares: {}", e)))?;
        let errors: Vec<ValidationError> = list
            .iter()
            .filter(|mw| !mw.is_sentinel())
            .filter(|mw| matches!(mw, MiddlewareRef::Named(name) if !state.registry.contains(name)))
            .map(|mw| ValidationError::UnknownMiddleware {
                route: id.clone(),
                name: mw.name().to_string(),
            })
            .collect();
        if !errors.is_empty() {
            return Err(ConsoleError::Invalid(errors));
        }
    }

    let (path, route) = state.db.update_route(&id, patch)?;
    tracing::info!(route = %path, id = %id, "Route updated from console");
    Ok(Json(route_entry(&path, &route)))
}

pub async fn get_store(State(state): State<AppState>) -> Json<Value> {
    Json(state.store.to_json())
}

pub async fn get_store_key(State(state): State<AppState>, Path(key): Path<String>) -> Result<Json<Value>, ConsoleError> {
    state.store.get(&key).map(Json).ok_or(ConsoleError::NotFound(key))
}

pub async fn get_rewriters(State(state): State<AppState>) -> Json<Value> {
    Json(state.rewriters.to_json())
}

/// Restore every route to its original definition and the store to its seed.
pub async fn reset_all(State(state): State<AppState>) -> Json<Value> {
    state.db.reset();
    state.store.reset();
    metrics::record_route_count(state.db.table().len());
    tracing::info!("Route map and store reset");
    Json(state.db.snapshot().to_json(false))
}

pub async fn reset_route(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ConsoleError> {
    let (path, route) = state.db.reset_route(&id)?;
    tracing::info!(route = %path, id = %id, "Route reset");
    Ok(Json(route_entry(&path, &route)))
}

/// Fetch now for one route, leaving its fetch budget as it is.
pub async fn refresh_route(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ConsoleError> {
    let table = state.db.table();
    let entry = table.find_by_id(&id).ok_or_else(|| ConsoleError::NotFound(id.clone()))?;
    if !entry.definition().has_fetch() {
        return Err(ConsoleError::BadRequest(format!("route '{}' has nothing to fetch", entry.path)));
    }

    let tpl = template::detached(state.config.template_view());
    state.resolver.refresh(&entry.path, &entry.slot, &tpl).await;
    tracing::info!(route = %entry.path, id = %id, "Route refreshed");
    Ok(Json(route_entry(&entry.path, &entry.definition())))
}

pub async fn get_routes(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.db.table().paths().map(str::to_string).collect())
}
