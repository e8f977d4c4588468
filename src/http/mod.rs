//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, body limit)
//!     → console routes (/_db, /_store, /_reset, ...)
//!     → fallback: pipeline::handle for every mock route
//!     → Send to client
//! ```

pub mod server;

pub use server::{AppState, HttpServer, X_REQUEST_ID};
