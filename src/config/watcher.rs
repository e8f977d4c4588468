//! Route map file watcher for hot reload.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::schema::ServerConfig;
use crate::db::RouteMap;
use crate::lifecycle::startup::load_route_map;
use crate::pipeline::MiddlewareRegistry;

/// A watcher that monitors the db and injector files for changes.
pub struct DbWatcher {
    config: ServerConfig,
    registry: Arc<MiddlewareRegistry>,
    paths: Vec<PathBuf>,
    update_tx: mpsc::UnboundedSender<RouteMap>,
}

impl DbWatcher {
    /// Create a new DbWatcher.
    ///
    /// Returns the watcher and a receiver for rebuilt route maps.
    pub fn new(config: &ServerConfig, registry: Arc<MiddlewareRegistry>) -> (Self, mpsc::UnboundedReceiver<RouteMap>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let paths = [&config.data.db_path, &config.data.injectors_path]
            .into_iter()
            .flatten()
            .map(|p| config.resolve_path(p))
            .collect();

        (
            Self {
                config: config.clone(),
                registry,
                paths,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the files in a background thread.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let config = self.config.clone();
        let registry = self.registry.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(paths = ?event.paths, "Route map change detected, reloading...");
                        match load_route_map(&config, &registry) {
                            Ok(map) => {
                                let _ = tx.send(map);
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to reload route map. Keeping current routes.");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for path in &self.paths {
            watcher.watch(path, RecursiveMode::NonRecursive)?;
        }

        tracing::info!(paths = ?self.paths, "Route map watcher started");
        Ok(watcher)
    }
}
