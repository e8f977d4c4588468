//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (port, base prefix, id field)
//! - Check middleware references against the registry
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function over already-parsed values

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::db::{MiddlewareRef, RouteMap};
use crate::pipeline::MiddlewareRegistry;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("listener port must be non-zero")]
    InvalidPort,
    #[error("base '{0}' must be empty or start with '/'")]
    InvalidBase(String),
    #[error("id_field must not be empty")]
    EmptyIdField,
    #[error("metrics address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
    #[error("route '{route}' references unknown middleware '{name}'")]
    UnknownMiddleware { route: String, name: String },
}

/// Validate the server configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }

    let base = &config.routing.base;
    if !base.is_empty() && !base.starts_with('/') {
        errors.push(ValidationError::InvalidBase(base.clone()));
    }

    if config.routing.id_field.trim().is_empty() {
        errors.push(ValidationError::EmptyIdField);
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Find every named middleware reference that the registry cannot resolve.
pub fn validate_middlewares(map: &RouteMap, registry: &MiddlewareRegistry) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (path, route) in map.iter() {
        for mw in route.middlewares.iter().flatten() {
            if let MiddlewareRef::Named(name) = mw {
                if !mw.is_sentinel() && !registry.contains(name) {
                    errors.push(ValidationError::UnknownMiddleware {
                        route: path.clone(),
                        name: name.clone(),
                    });
                }
            }
        }
    }
    errors
}
