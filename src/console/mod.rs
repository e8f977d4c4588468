//! Console backend routes.
//!
//! ```text
//! GET        /_db[?_clean=true]   live route map (clean: runtime fields removed)
//! POST       /_db                 add routes (normalized + injected)
//! GET|PUT    /_db/{id}            one route / overwrite its fields
//! GET        /_store[/{key}]      shared store
//! GET        /_rewriters          rewrite table
//! GET|POST   /_reset[/{id}]       restore the original map (and store) / one route
//! GET|POST   /_refresh/{id}       fetch now, budget untouched
//! GET        /_routes             route paths in match order
//! ```

pub mod handlers;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use thiserror::Error;

use crate::config::validation::ValidationError;
use crate::db::DbError;
use crate::error::error_response;
use crate::http::AppState;

use self::handlers::*;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid routes: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Invalid(Vec<ValidationError>),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl IntoResponse for ConsoleError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ConsoleError::NotFound(_) | ConsoleError::Db(DbError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            ConsoleError::BadRequest(_) | ConsoleError::Db(DbError::Invalid(_)) => (StatusCode::BAD_REQUEST, "bad_request"),
            ConsoleError::Invalid(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        };
        error_response(status, code, self.to_string())
    }
}

pub fn setup_console_router() -> Router<AppState> {
    Router::new()
        .route("/_db", get(get_db).post(add_routes))
        .route("/_db/{id}", get(get_route).put(update_route))
        .route("/_store", get(get_store))
        .route("/_store/{key}", get(get_store_key))
        .route("/_rewriters", get(get_rewriters))
        .route("/_reset", get(reset_all).post(reset_all))
        .route("/_reset/{id}", get(reset_route).post(reset_route))
        .route("/_refresh/{id}", get(refresh_route).post(refresh_route))
        .route("/_routes", get(get_routes))
}
