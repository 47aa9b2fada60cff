//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Routers and acceptor produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (connection hand-off counters)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Every hand-off event carries a `from` field; router events add `connection_id`
//! - Metrics are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
