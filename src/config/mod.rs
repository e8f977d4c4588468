//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + CLI overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! db / injector files (JSON, JSONC)
//!     → loader.rs (read, strip comments)
//!     → db::normalize + db::injector (see lifecycle::startup)
//!
//! On file change:
//!     watcher.rs detects change
//!     → rebuilds the route map
//!     → atomic swap of the live route table
//! ```
//!
//! # Design Decisions
//! - Server config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - A route map that fails to reload leaves the current one in place

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{
    DataConfig, FetchConfig, LimitsConfig, ListenerConfig, ObservabilityConfig, RoutingConfig,
    ServerConfig,
};
