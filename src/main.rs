//! Declarative mock / proxy HTTP server.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                     MOCK SERVER                       │
//!                     │                                                       │
//!   Client Request    │  ┌──────────┐   ┌───────────┐   ┌────────────────┐    │
//!   ──────────────────┼─▶│  http    │──▶│ rewriters │──▶│ routing table  │    │
//!                     │  │  server  │   │  + base   │   │ (first match)  │    │
//!                     │  └────┬─────┘   └───────────┘   └───────┬────────┘    │
//!                     │       │ /_db /_store /_reset ...        ▼             │
//!                     │       ▼                          ┌────────────────┐   │
//!                     │  ┌──────────┐                    │ fetch resolver │───┼──▶ Upstream
//!                     │  │ console  │                    │  (fetchCount)  │   │    / files
//!                     │  └──────────┘                    └───────┬────────┘   │
//!                     │                                          ▼            │
//!   Client Response   │  ┌──────────┐   ┌────────────────────────────────┐    │
//!   ◀─────────────────┼──│finalizer │◀──│ middlewares (_CrudOperation..) │    │
//!                     │  └──────────┘   └────────────────────────────────┘    │
//!                     │                                                       │
//!                     │   config · db + injectors · store · observability    │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use mock_server::config::loader::load_config;
use mock_server::config::validation::validate_config;
use mock_server::config::watcher::DbWatcher;
use mock_server::config::{ConfigError, ServerConfig};
use mock_server::lifecycle::signals::wait_for_signal;
use mock_server::lifecycle::startup::build_state;
use mock_server::observability::{logging, metrics};
use mock_server::{HttpServer, MiddlewareRegistry, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "mock-server")]
#[command(about = "Serve a JSON route map as a mock / proxy HTTP server", long_about = None)]
struct Args {
    /// TOML server configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Route map (JSON or JSONC)
    #[arg(long)]
    db: Option<PathBuf>,

    #[arg(long)]
    injectors: Option<PathBuf>,

    #[arg(long)]
    rewriters: Option<PathBuf>,

    /// Initial contents of the shared store
    #[arg(long)]
    store: Option<PathBuf>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    host: Option<String>,

    /// URL prefix for mock routes
    #[arg(long)]
    base: Option<String>,

    /// Directory for relative data files and local fetches
    #[arg(long)]
    root: Option<PathBuf>,

    /// Reload the db and injector files when they change
    #[arg(long)]
    watch: bool,

    /// Send no-cache headers on mock responses (on unless set to false)
    #[arg(long)]
    no_cache: Option<bool>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(db) = self.db {
            config.data.db_path = Some(db);
        }
        if let Some(injectors) = self.injectors {
            config.data.injectors_path = Some(injectors);
        }
        if let Some(rewriters) = self.rewriters {
            config.data.rewriters_path = Some(rewriters);
        }
        if let Some(store) = self.store {
            config.data.store_path = Some(store);
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(host) = self.host {
            config.listener.host = host;
        }
        if let Some(base) = self.base {
            config.routing.base = base;
        }
        if let Some(root) = self.root {
            config.data.root = root;
        }
        config.data.watch |= self.watch;
        if let Some(no_cache) = self.no_cache {
            config.routing.no_cache = no_cache;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = Args::parse();

    let mut config = match args.config.take() {
        Some(path) => load_config(&path)?,
        None => ServerConfig::default(),
    };
    args.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability);
    tracing::info!("mock-server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address(),
        base = %config.routing.base,
        db = ?config.data.db_path,
        watch = config.data.watch,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = MiddlewareRegistry::with_builtins();
    let state = build_state(config.clone(), registry.clone())?;

    let (_watcher, reloads) = if config.data.watch {
        let (watcher, reloads) = DbWatcher::new(&config, Arc::new(registry));
        match watcher.run() {
            Ok(handle) => (Some(handle), Some(reloads)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to start route map watcher");
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let listener = TcpListener::bind(config.listener.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(state);
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe(), reloads));

    tokio::select! {
        result = &mut server_task => result??,
        _ = wait_for_signal() => {
            shutdown.trigger();
            server_task.await??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
