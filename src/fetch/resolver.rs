//! Per-route fetch resolution.
//!
//! # Responsibilities
//! - Decide whether a request triggers fetch I/O, from the route's `fetchCount`
//! - Perform the I/O (remote or local) and record the outcome on the route
//! - Serialize decisions per route so a budget of k never yields more than k calls
//!
//! # Design Decisions
//! - The route's fetch gate is held across the I/O; other requests to the
//!   same route wait and then observe the recorded outcome
//! - Streamed files are never cached; each hit streams again and still
//!   spends one unit of a positive budget

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ServerConfig;
use crate::db::{FetchData, RouteSlot};
use crate::fetch::file;
use crate::fetch::request::{self, FetchTarget};
use crate::fetch::FetchError;
use crate::observability::metrics;
use crate::template::TemplateContext;

/// What the fetch stage should use for this request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The route has nothing to fetch.
    Skipped,
    /// Budget exhausted; the last recorded outcome, if any.
    Cached(Option<FetchData>),
    /// Fresh outcome from I/O performed for this request.
    Fetched(FetchData),
    /// A local file to stream as the response.
    Stream(PathBuf),
}

impl FetchOutcome {
    /// Fetch data to hand to the rest of the pipeline.
    pub fn data(&self) -> Option<&FetchData> {
        match self {
            FetchOutcome::Cached(data) => data.as_ref(),
            FetchOutcome::Fetched(data) => Some(data),
            FetchOutcome::Skipped | FetchOutcome::Stream(_) => None,
        }
    }
}

/// Performs fetches on behalf of routes.
#[derive(Debug, Clone)]
pub struct FetchResolver {
    client: reqwest::Client,
    root: PathBuf,
}

impl FetchResolver {
    pub fn new(config: &ServerConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(config.fetch.insecure);
        if config.fetch.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.fetch.timeout_secs));
        }
        let client = builder.build()?;
        Ok(Self {
            client,
            root: config.data.root.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the route's fetch for one request, honouring `fetchCount`.
    pub async fn resolve(&self, route_path: &str, slot: &RouteSlot, tpl: &TemplateContext) -> FetchOutcome {
        let _gate = slot.fetch_gate().lock().await;

        let route = slot.read();
        let Some(spec) = route.fetch.clone().filter(|f| !f.is_empty()) else {
            return FetchOutcome::Skipped;
        };

        let count = route.effective_fetch_count();
        if count == 0 {
            metrics::record_fetch(route_path, "cached");
            return FetchOutcome::Cached(route.fetch_data);
        }

        let outcome = self.perform(route_path, &spec, tpl).await;
        slot.update(|r| {
            if count > 0 {
                r.fetch_count = Some(count - 1);
            }
            if let FetchOutcome::Fetched(data) = &outcome {
                r.fetch_data = Some(data.clone());
                r.clear_transform_caches();
            }
        });
        outcome
    }

    /// Fetch now regardless of the remaining budget, leaving the budget as is.
    pub async fn refresh(&self, route_path: &str, slot: &RouteSlot, tpl: &TemplateContext) -> FetchOutcome {
        let _gate = slot.fetch_gate().lock().await;

        let Some(spec) = slot.read().fetch.filter(|f| !f.is_empty()) else {
            return FetchOutcome::Skipped;
        };

        let outcome = self.perform(route_path, &spec, tpl).await;
        if let FetchOutcome::Fetched(data) = &outcome {
            slot.update(|r| {
                r.fetch_data = Some(data.clone());
                r.clear_transform_caches();
            });
        }
        outcome
    }

    async fn perform(&self, route_path: &str, spec: &crate::db::FetchSpec, tpl: &TemplateContext) -> FetchOutcome {
        let target = match request::prepare(spec, tpl, &self.root) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(route = %route_path, error = %e, "Invalid fetch definition");
                metrics::record_fetch(route_path, "error");
                return FetchOutcome::Fetched(FetchData::error(e.status_code(), e.to_string()));
            }
        };

        let data = match target {
            FetchTarget::File(path) if file::is_streamed(&path) => {
                metrics::record_fetch(route_path, "stream");
                return FetchOutcome::Stream(path);
            }
            FetchTarget::File(path) => {
                tracing::debug!(route = %route_path, path = %path.display(), "Reading fetch file");
                match file::read_file(&path).await {
                    Ok(response) => FetchData {
                        response,
                        status_code: 200,
                        ..FetchData::default()
                    },
                    Err(e) => FetchData::error(e.status_code(), e.to_string()),
                }
            }
            FetchTarget::Remote(remote) => {
                tracing::debug!(route = %route_path, method = %remote.method, url = %remote.url, "Fetching remote");
                request::send(&self.client, remote).await
            }
        };

        if data.is_error {
            tracing::warn!(
                route = %route_path,
                status = data.status_code,
                reason = data.message.as_deref().unwrap_or_default(),
                "Fetch failed"
            );
            metrics::record_fetch(route_path, "error");
        } else {
            metrics::record_fetch(route_path, "ok");
        }
        FetchOutcome::Fetched(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FetchSpec, RouteDefinition};
    use serde_json::json;
    use std::io::Write;
    use std::sync::Arc;

    fn resolver(root: &Path) -> FetchResolver {
        let mut config = ServerConfig::default();
        config.data.root = root.to_path_buf();
        FetchResolver::new(&config).unwrap()
    }

    fn slot_for(fetch: &str, count: Option<i64>) -> RouteSlot {
        RouteSlot::new(RouteDefinition {
            fetch: Some(FetchSpec::Url(fetch.to_string())),
            fetch_count: count,
            ..RouteDefinition::default()
        })
    }

    fn data_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("users.json")).unwrap();
        write!(f, r#"[{{"id": 1}}]"#).unwrap();
        std::fs::write(dir.path().join("logo.png"), [0x89, 0x50]).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_default_budget_fetches_once() {
        let dir = data_dir();
        let resolver = resolver(dir.path());
        let slot = slot_for("users.json", None);
        let tpl = TemplateContext::default();

        let first = resolver.resolve("/users", &slot, &tpl).await;
        assert!(matches!(first, FetchOutcome::Fetched(_)));
        assert_eq!(first.data().unwrap().response, json!([{"id": 1}]));
        assert_eq!(slot.read().fetch_count, Some(0));

        let second = resolver.resolve("/users", &slot, &tpl).await;
        assert!(matches!(second, FetchOutcome::Cached(Some(_))));
    }

    #[tokio::test]
    async fn test_unlimited_budget_is_untouched() {
        let dir = data_dir();
        let resolver = resolver(dir.path());
        let slot = slot_for("users.json", Some(-1));
        let tpl = TemplateContext::default();

        for _ in 0..3 {
            assert!(matches!(resolver.resolve("/users", &slot, &tpl).await, FetchOutcome::Fetched(_)));
        }
        assert_eq!(slot.read().fetch_count, Some(-1));
    }

    #[tokio::test]
    async fn test_zero_budget_serves_cache_only() {
        let dir = data_dir();
        let resolver = resolver(dir.path());
        let slot = slot_for("users.json", Some(0));

        let outcome = resolver.resolve("/users", &slot, &TemplateContext::default()).await;
        assert!(matches!(outcome, FetchOutcome::Cached(None)));
    }

    #[tokio::test]
    async fn test_missing_file_recorded_as_error() {
        let dir = data_dir();
        let resolver = resolver(dir.path());
        let slot = slot_for("missing.json", None);

        let outcome = resolver.resolve("/m", &slot, &TemplateContext::default()).await;
        let data = outcome.data().unwrap();
        assert!(data.is_error);
        assert_eq!(data.status_code, 404);
        assert!(slot.read().fetch_data.unwrap().is_error);
    }

    #[tokio::test]
    async fn test_streamed_file_spends_budget() {
        let dir = data_dir();
        let resolver = resolver(dir.path());
        let slot = slot_for("logo.png", Some(2));

        let outcome = resolver.resolve("/logo", &slot, &TemplateContext::default()).await;
        assert!(matches!(outcome, FetchOutcome::Stream(ref p) if p.ends_with("logo.png")));
        assert_eq!(slot.read().fetch_count, Some(1));
        assert!(slot.read().fetch_data.is_none());
    }

    #[tokio::test]
    async fn test_refresh_ignores_budget() {
        let dir = data_dir();
        let resolver = resolver(dir.path());
        let slot = slot_for("users.json", Some(0));

        let outcome = resolver.refresh("/users", &slot, &TemplateContext::default()).await;
        assert!(matches!(outcome, FetchOutcome::Fetched(_)));
        assert_eq!(slot.read().fetch_count, Some(0));
        assert!(slot.read().fetch_data.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_requests_respect_budget() {
        let dir = data_dir();
        let resolver = Arc::new(resolver(dir.path()));
        let slot = Arc::new(slot_for("users.json", Some(2)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let resolver = resolver.clone();
            let slot = slot.clone();
            handles.push(tokio::spawn(async move {
                resolver.resolve("/users", &slot, &TemplateContext::default()).await
            }));
        }
        let mut fetched = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), FetchOutcome::Fetched(_)) {
                fetched += 1;
            }
        }
        assert_eq!(fetched, 2);
        assert_eq!(slot.read().fetch_count, Some(0));
    }
}
