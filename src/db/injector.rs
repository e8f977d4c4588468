//! Injector rules: pattern-matched overrides applied after normalization.
//!
//! # Merge Rules
//! ```text
//! override = false   existing fields win, the rule only fills gaps
//! override = true    rule fields win; "..." in the rule's middleware list
//!                    expands to the existing list, then duplicates are dropped
//! ```
//! Rules apply in order, so a later rule may re-override an earlier one.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::db::normalize::normalize_route_path;
use crate::db::route::{dedup_middlewares, MiddlewareRef, RouteDefinition, RouteMap};
use crate::routing::matcher::PathPattern;

/// Fields that only steer injection and never reach a route definition.
const RULE_ONLY_FIELDS: &[&str] = &["routes", "override", "exact", "middlewares", "id", "_config"];

/// A pattern-based override applied to every matching route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InjectorRule {
    #[serde(deserialize_with = "one_or_many")]
    pub routes: Vec<String>,
    #[serde(default, rename = "override")]
    pub override_existing: bool,
    #[serde(default)]
    pub exact: bool,
    #[serde(default)]
    pub middlewares: Option<Vec<MiddlewareRef>>,
    /// Partial route definition fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(route) => vec![route],
        OneOrMany::Many(routes) => routes,
    })
}

impl InjectorRule {
    /// Route paths in `map` this rule applies to, in map order.
    pub fn matched_paths(&self, map: &RouteMap) -> Vec<String> {
        let patterns: Vec<String> = self
            .routes
            .iter()
            .flat_map(|r| r.split(','))
            .filter(|r| !r.trim().is_empty())
            .map(normalize_route_path)
            .collect();

        if self.exact {
            return map
                .paths()
                .filter(|path| patterns.iter().any(|p| p == *path))
                .cloned()
                .collect();
        }

        let compiled: Vec<PathPattern> = patterns.iter().map(|p| PathPattern::parse(p)).collect();
        map.paths()
            .filter(|path| compiled.iter().any(|p| p.matches(path).is_some()))
            .cloned()
            .collect()
    }

    /// Merge this rule into one route definition.
    pub fn apply(&self, route: &RouteDefinition) -> RouteDefinition {
        let had_fetch = route.has_fetch();

        let mut merged = match serde_json::to_value(route) {
            Ok(Value::Object(map)) => map,
            _ => return route.clone(),
        };
        merged.remove("middlewares");

        for (key, value) in &self.fields {
            if RULE_ONLY_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if self.override_existing || !merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
            }
        }

        let mut result = match serde_json::from_value::<RouteDefinition>(Value::Object(merged)) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(id = %route.id, error = %e, "Injector produced an invalid definition, rule skipped");
                return route.clone();
            }
        };

        result.id = route.id.clone();
        result.direct_use = route.direct_use;
        // binary bodies are not part of the JSON form
        if let (Some(before), Some(after)) = (&route.fetch_data, result.fetch_data.as_mut()) {
            after.binary = before.binary.clone();
        }
        result.middlewares = self.merge_middlewares(route.middlewares.as_deref());

        if had_fetch && !result.has_fetch() {
            result.fetch_count = None;
            result.skip_fetch_error = None;
        }

        result
    }

    fn merge_middlewares(&self, existing: Option<&[MiddlewareRef]>) -> Option<Vec<MiddlewareRef>> {
        let existing_list = existing.unwrap_or_default();

        let Some(rule_list) = &self.middlewares else {
            return existing.map(<[MiddlewareRef]>::to_vec);
        };

        if !self.override_existing && !existing_list.is_empty() {
            return existing.map(<[MiddlewareRef]>::to_vec);
        }

        let mut merged = Vec::with_capacity(rule_list.len() + existing_list.len());
        for mw in rule_list {
            if mw.is_sentinel() {
                merged.extend(existing_list.iter().cloned());
            } else {
                merged.push(mw.clone());
            }
        }
        Some(dedup_middlewares(merged))
    }
}

/// Apply rules in order onto a normalized route map.
pub fn apply_injectors(map: &mut RouteMap, rules: &[InjectorRule]) {
    for (index, rule) in rules.iter().enumerate() {
        let matched = rule.matched_paths(map);
        tracing::debug!(rule = index, matched = matched.len(), "Applying injector");
        for path in matched {
            if let Some(route) = map.get_mut(&path) {
                *route = rule.apply(route);
            }
        }
    }
}

/// Parse an injector document. Invalid rules are skipped with a warning.
pub fn parse_injectors(value: Value) -> Vec<InjectorRule> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => return Vec::new(),
        _ => {
            tracing::warn!("Injectors must be a JSON array, ignoring");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<InjectorRule>(item) {
            Ok(rule) => Some(rule),
            Err(e) => {
                tracing::warn!(rule = index, error = %e, "Skipping invalid injector");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::normalize::{normalize_json_db, NormalizeOptions};
    use serde_json::json;

    fn map(value: Value) -> RouteMap {
        normalize_json_db(value, NormalizeOptions::default())
    }

    fn rules(value: Value) -> Vec<InjectorRule> {
        parse_injectors(value)
    }

    fn names(route: &RouteDefinition) -> Vec<String> {
        route
            .middlewares
            .iter()
            .flatten()
            .map(|m| m.name().to_string())
            .collect()
    }

    #[test]
    fn test_fill_gaps_only() {
        let mut db = map(json!({
            "/users": {"_config": true, "mock": [], "delay": 10},
            "/posts": {"_config": true, "mock": []}
        }));
        let before = db.get("/users").unwrap().clone();

        apply_injectors(&mut db, &rules(json!([{ "routes": "/*", "delay": 500, "statusCode": 202 }])));

        let users = db.get("/users").unwrap();
        assert_eq!(users.delay, Some(10));
        assert_eq!(users.status_code, Some(202));
        assert_eq!(users.mock, before.mock);
        assert_eq!(users.id, before.id);
        assert_eq!(db.get("/posts").unwrap().delay, Some(500));
    }

    #[test]
    fn test_override_wins() {
        let mut db = map(json!({ "/users": {"_config": true, "mock": [], "delay": 10} }));
        apply_injectors(
            &mut db,
            &rules(json!([{ "routes": ["/users"], "override": true, "delay": 0 }])),
        );
        assert_eq!(db.get("/users").unwrap().delay, Some(0));
    }

    #[test]
    fn test_sentinel_expands_in_place() {
        let mut db = map(json!({
            "/users": {"_config": true, "middlewares": ["_ReadOnly", "_CrudOperation"]}
        }));
        apply_injectors(
            &mut db,
            &rules(json!([{
                "routes": "/users",
                "override": true,
                "middlewares": ["_MockOnly", "...", "_CrudOperation", "_IterateResponse"]
            }])),
        );
        assert_eq!(
            names(db.get("/users").unwrap()),
            vec!["_MockOnly", "_ReadOnly", "_CrudOperation", "_IterateResponse"]
        );
    }

    #[test]
    fn test_non_override_keeps_existing_middlewares() {
        let mut db = map(json!({
            "/a": {"_config": true, "middlewares": ["_ReadOnly"]},
            "/b": {"_config": true}
        }));
        apply_injectors(
            &mut db,
            &rules(json!([{ "routes": "/*", "middlewares": ["...", "_MockOnly"] }])),
        );
        assert_eq!(names(db.get("/a").unwrap()), vec!["_ReadOnly"]);
        assert_eq!(names(db.get("/b").unwrap()), vec!["_MockOnly"]);
    }

    #[test]
    fn test_exact_matching() {
        let mut db = map(json!({ "/users": 1, "/users/:id": 2 }));
        apply_injectors(
            &mut db,
            &rules(json!([{ "routes": "/users/:id", "exact": true, "delay": 1 }])),
        );
        assert_eq!(db.get("/users").unwrap().delay, None);
        assert_eq!(db.get("/users/:id").unwrap().delay, Some(1));
    }

    #[test]
    fn test_pattern_param_matching() {
        let mut db = map(json!({ "/users/:id": 1, "/posts/:id": 2, "/users": 3 }));
        apply_injectors(&mut db, &rules(json!([{ "routes": "/users/:x", "delay": 1 }])));
        assert_eq!(db.get("/users/:id").unwrap().delay, Some(1));
        assert_eq!(db.get("/posts/:id").unwrap().delay, None);
        assert_eq!(db.get("/users").unwrap().delay, None);
    }

    #[test]
    fn test_lost_fetch_drops_fetch_fields() {
        let mut db = map(json!({
            "/remote": {"_config": true, "fetch": "http://x", "fetchCount": 3, "skipFetchError": true}
        }));
        apply_injectors(
            &mut db,
            &rules(json!([{ "routes": "/remote", "override": true, "fetch": null, "mock": "local" }])),
        );
        let route = db.get("/remote").unwrap();
        assert!(!route.has_fetch());
        assert_eq!(route.fetch_count, None);
        assert_eq!(route.skip_fetch_error, None);
        assert_eq!(route.mock, Some(json!("local")));
    }

    #[test]
    fn test_rule_only_fields_stripped() {
        let mut db = map(json!({ "/a": 1 }));
        apply_injectors(&mut db, &rules(json!([{ "routes": "/a", "exact": true, "override": true }])));
        let value = serde_json::to_value(db.get("/a").unwrap()).unwrap();
        assert!(value.get("routes").is_none());
        assert!(value.get("exact").is_none());
        assert!(value.get("override").is_none());
    }

    #[test]
    fn test_later_rules_reoverride() {
        let mut db = map(json!({ "/a": 1 }));
        apply_injectors(
            &mut db,
            &rules(json!([
                { "routes": "/a", "delay": 1 },
                { "routes": "/a", "override": true, "delay": 2 }
            ])),
        );
        assert_eq!(db.get("/a").unwrap().delay, Some(2));
    }

    #[test]
    fn test_invalid_rules_skipped() {
        let parsed = rules(json!([{ "delay": 1 }, { "routes": "/a" }]));
        assert_eq!(parsed.len(), 1);
        assert!(parse_injectors(json!({"routes": "/a"})).is_empty());
    }
}
