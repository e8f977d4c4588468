//! Fetch resolution subsystem.
//!
//! # Data Flow
//! ```text
//! RouteDefinition.fetch (+ request-scoped template variables)
//!     → request.rs (substitute placeholders, classify URL vs local file)
//!     → resolver.rs (fetchCount budget, single flight per route)
//!         → remote: reqwest call, classify status
//!         → local:  file.rs (parse by extension, or stream)
//!     → FetchData recorded on the route, transform caches cleared
//! ```
//!
//! # Design Decisions
//! - Failures never propagate as errors: they are captured into `FetchData`
//! - `fetchCount`: > 0 budgeted, 0 serve cache, -1 always fetch
//! - Timeouts come from the server config, applied on the client

pub mod file;
pub mod request;
pub mod resolver;

use axum::http::StatusCode;
use thiserror::Error;

pub use resolver::{FetchOutcome, FetchResolver};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid fetch request: {0}")]
    Invalid(String),
}

impl FetchError {
    /// Status recorded on the route for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            FetchError::Http(e) => e
                .status()
                .map(|s| s.as_u16())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR.as_u16()),
            FetchError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                StatusCode::NOT_FOUND.as_u16()
            }
            FetchError::Invalid(_) => StatusCode::BAD_REQUEST.as_u16(),
            _ => StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}
