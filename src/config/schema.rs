//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the mock server.
//! All types derive Serde traits for deserialization from TOML files, and every
//! section is defaulted so an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Root configuration for the mock server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (host, port).
    pub listener: ListenerConfig,

    /// Route map and companion files.
    pub data: DataConfig,

    /// Request handling behaviour.
    pub routing: RoutingConfig,

    /// Outbound fetch settings.
    pub fetch: FetchConfig,

    /// Request limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ServerConfig {
    /// Resolve a possibly relative path against the configured root directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data.root.join(path)
        }
    }

    /// The whitelisted view of the configuration exposed to `${config.*}` templates.
    pub fn template_view(&self) -> Value {
        json!({
            "host": self.listener.host,
            "port": self.listener.port,
            "base": self.routing.base,
            "root": self.data.root.display().to_string(),
            "idField": self.routing.id_field,
        })
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub host: String,
    pub port: u16,
}

impl ListenerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
        }
    }
}

/// Locations of the route map and its companion files.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory that relative fetch paths and data files resolve against.
    pub root: PathBuf,

    /// Route map file (JSON or JSONC).
    pub db_path: Option<PathBuf>,

    /// Injector rules file (JSON array).
    pub injectors_path: Option<PathBuf>,

    /// Rewrite table file (JSON object).
    pub rewriters_path: Option<PathBuf>,

    /// Initial shared store contents (JSON object).
    pub store_path: Option<PathBuf>,

    /// Reload the route map when the db or injector files change.
    pub watch: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            db_path: None,
            injectors_path: None,
            rewriters_path: None,
            store_path: None,
            watch: false,
        }
    }
}

/// Request handling behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// URL prefix every mock route is mounted under (e.g. "/api"). Empty for none.
    pub base: String,

    /// Identifier field used by the collection transforms.
    pub id_field: String,

    /// Reverse declaration order: earlier declarations win and match first.
    pub reverse: bool,

    /// Force no-cache response headers on every mock route.
    pub no_cache: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base: String::new(),
            id_field: "id".to_string(),
            reverse: false,
            no_cache: true,
        }
    }
}

/// Outbound fetch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Total timeout for a remote fetch in seconds. Zero disables the timeout.
    pub timeout_secs: u64,

    /// Accept invalid TLS certificates on remote fetches.
    pub insecure: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            insecure: false,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
