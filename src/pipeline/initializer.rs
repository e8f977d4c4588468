//! Initializer stage: load the matched route and seed response state.

use axum::response::{IntoResponse, Redirect, Response};

use crate::http::AppState;
use crate::pipeline::context::{RequestContext, RequestInfo};
use crate::routing::RouteMatch;

/// Where to redirect when a fetch-capable route was hit without any of its
/// optional parameters; the missing ones are filled with their own names so
/// fetch templates never see an undefined parameter.
pub fn redirect_location(matched: &RouteMatch, has_fetch: bool, base: &str, query: Option<&str>) -> Option<String> {
    if !has_fetch {
        return None;
    }
    let optional = matched.pattern.optional_params();
    if optional.is_empty() || optional.iter().any(|p| matched.params.contains_key(*p)) {
        return None;
    }

    let mut location = format!("{}{}", base, matched.pattern.fill(&matched.params));
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        location.push('?');
        location.push_str(query);
    }
    Some(location)
}

pub fn initialize(state: &AppState, matched: RouteMatch, mut request: RequestInfo) -> Result<RequestContext, Response> {
    let route = matched.slot.read();
    if let Some(location) = redirect_location(
        &matched,
        route.has_fetch() && !route.direct_use,
        &state.config.routing.base,
        request.uri.query(),
    ) {
        tracing::debug!(route = %matched.path, location = %location, "Filling optional parameters");
        return Err(Redirect::temporary(&location).into_response());
    }

    request.params = matched.params;
    Ok(RequestContext::new(
        request,
        matched.path,
        matched.slot,
        state.store.clone(),
        state.config.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{normalize_json_db, NormalizeOptions};
    use crate::routing::RouteTable;
    use serde_json::json;

    fn table() -> RouteTable {
        RouteTable::from_map(normalize_json_db(
            json!({ "/users/:id?": {"_config": true, "fetch": "http://api/users/${req.params.id}"} }),
            NormalizeOptions::default(),
        ))
    }

    #[test]
    fn test_redirect_when_optional_missing() {
        let matched = table().match_path("/users").unwrap();
        assert_eq!(
            redirect_location(&matched, true, "/api", Some("a=1")),
            Some("/api/users/id?a=1".to_string())
        );
    }

    #[test]
    fn test_no_redirect_when_supplied_or_no_fetch() {
        let table = table();
        let matched = table.match_path("/users/4").unwrap();
        assert_eq!(redirect_location(&matched, true, "", None), None);

        let matched = table.match_path("/users").unwrap();
        assert_eq!(redirect_location(&matched, false, "", None), None);
    }
}
