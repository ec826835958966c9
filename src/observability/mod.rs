//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! manager / registry / watch states produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (gauges and counters)
//!
//! Consumers:
//!     → stdout (text or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (proxy_id, watch_id, generation) instead of formatted text
//! - Metric updates are fire-and-forget; no recorder installed means no-op

pub mod logging;
pub mod metrics;
