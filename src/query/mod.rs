//! Collection query engine.
//!
//! Pure functions over an in-memory array of JSON records that share one
//! identifier field.
//!
//! # Data Flow
//! ```text
//! query string pairs → Query::from_pairs
//!     → search.rs (filter → full text → sort → slice/paginate → first/last)
//!     → SearchResult { selection, total, pagination }
//!
//! request body → mutate.rs (insert / update / replace / remove)
//! ```
//!
//! # Design Decisions
//! - Values are compared as strings unless both sides parse as numbers
//! - Repeated keys OR together, except `_ne` which excludes every value
//! - Distinct keys AND together
//! - `total` is always the filtered count before any slicing

pub mod mutate;
pub mod search;

pub use mutate::{find_index, id_matches, insert, next_id, remove, replace, update};
pub use search::{link_header, search, Filter, FilterOp, Pagination, Query, SearchResult, Selection};
