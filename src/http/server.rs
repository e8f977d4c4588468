//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with console routes and the mock pipeline fallback
//! - Wire up middleware (tracing, body limit, request ID)
//! - Bind server to listener and serve until shutdown
//! - Swap in hot-reloaded route maps

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::console;
use crate::db::{Db, InjectorRule, RouteMap};
use crate::fetch::{FetchError, FetchResolver};
use crate::observability::metrics;
use crate::pipeline::{self, MiddlewareRegistry};
use crate::routing::Rewriters;
use crate::store::Store;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub db: Arc<Db>,
    pub store: Store,
    pub registry: Arc<MiddlewareRegistry>,
    pub rewriters: Arc<Rewriters>,
    /// Applied again to routes added through the console.
    pub injectors: Arc<Vec<InjectorRule>>,
    pub resolver: Arc<FetchResolver>,
}

impl AppState {
    /// State serving an already normalized and injected route map.
    pub fn new(config: ServerConfig, map: RouteMap, registry: MiddlewareRegistry) -> Result<Self, FetchError> {
        let resolver = FetchResolver::new(&config)?;
        metrics::record_route_count(map.len());
        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(Db::new(map)),
            store: Store::default(),
            registry: Arc::new(registry),
            rewriters: Arc::new(Rewriters::default()),
            injectors: Arc::new(Vec::new()),
            resolver: Arc::new(resolver),
        })
    }

    pub fn with_store(mut self, store: Store) -> Self {
        self.store = store;
        self
    }

    pub fn with_rewriters(mut self, rewriters: Rewriters) -> Self {
        self.rewriters = Arc::new(rewriters);
        self
    }

    pub fn with_injectors(mut self, injectors: Vec<InjectorRule>) -> Self {
        self.injectors = Arc::new(injectors);
        self
    }
}

/// HTTP server for the mock routes and the console.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);
        let body_limit = state.config.limits.max_body_size;

        console::setup_console_router()
            .fallback(pipeline::handle)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(body_limit))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `shutdown` fires. Route maps arriving on `reloads` replace
    /// the live table and the reset snapshot.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
        reloads: Option<mpsc::UnboundedReceiver<RouteMap>>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.state.db.table().len(),
            "HTTP server starting"
        );

        if let Some(mut reloads) = reloads {
            let db = self.state.db.clone();
            let mut stop = shutdown.resubscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(map) = reloads.recv() => {
                            let count = map.len();
                            db.replace(map);
                            metrics::record_route_count(count);
                            tracing::info!(routes = count, "Route map reloaded");
                        }
                        _ = stop.recv() => break,
                        else => break,
                    }
                }
                tracing::debug!("Route map reload task stopped");
            });
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
