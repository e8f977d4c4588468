//! Declarative mock and proxy HTTP server library.
//!
//! Routes come from a JSON db: each one serves a mock, a fetched upstream
//! response or a local file, shaped by named middlewares and managed at
//! runtime through the console routes.

pub mod config;
pub mod console;
pub mod db;
pub mod error;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod query;
pub mod routing;
pub mod store;
pub mod template;
pub mod transforms;

pub use config::schema::ServerConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
pub use pipeline::{Flow, Middleware, MiddlewareRegistry, RequestContext};
