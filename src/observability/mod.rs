//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline / fetch / console produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the trace layer into every request span
//! - Metrics are cheap; the recorder is only installed when enabled

pub mod logging;
pub mod metrics;
