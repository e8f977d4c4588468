//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → strip configured base prefix
//!     → rewriter.rs (rewrite table, first match)
//!     → router.rs (ordered route lookup)
//!     → matcher.rs (segment pattern match, capture params)
//!     → Return: matched route + params, or NoMatch (404)
//!
//! Table compilation:
//!     RouteMap (normalized + injected)
//!     → compile patterns in declaration order
//!     → freeze as immutable RouteTable, swapped atomically on edits
//! ```
//!
//! # Design Decisions
//! - No regex in the hot path (segment matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod rewriter;
pub mod router;

pub use matcher::{PathParams, PathPattern};
pub use rewriter::Rewriters;
pub use router::{RouteEntry, RouteMatch, RouteTable};
