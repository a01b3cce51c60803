//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! acceptor, connector, sessions
//!     → logging.rs (structured events keyed by session_id / client_id)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Frame payloads are never logged, only counts and sizes
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
