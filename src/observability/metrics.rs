//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_sessions_total` (counter): sessions admitted
//! - `relay_active_sessions` (gauge): sessions holding an admission slot
//! - `relay_rejections_total` (counter, label `reason`): refused upgrades
//! - `relay_backend_connect_failures_total` (counter)
//! - `relay_frames_total` / `relay_bytes_total` (counter, label `direction`)
//! - `relay_session_duration_seconds` (histogram)

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const SESSIONS_TOTAL: &str = "relay_sessions_total";
pub const ACTIVE_SESSIONS: &str = "relay_active_sessions";
pub const REJECTIONS_TOTAL: &str = "relay_rejections_total";
pub const BACKEND_CONNECT_FAILURES_TOTAL: &str = "relay_backend_connect_failures_total";
pub const FRAMES_TOTAL: &str = "relay_frames_total";
pub const BYTES_TOTAL: &str = "relay_bytes_total";
pub const SESSION_DURATION_SECONDS: &str = "relay_session_duration_seconds";

/// Install the global Prometheus recorder with its own HTTP scrape listener.
/// Must run inside the tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_session_started() {
    ::metrics::counter!(SESSIONS_TOTAL).increment(1);
}

pub fn record_session_finished(duration: Duration) {
    ::metrics::histogram!(SESSION_DURATION_SECONDS).record(duration.as_secs_f64());
}

pub fn set_active_sessions(count: u64) {
    ::metrics::gauge!(ACTIVE_SESSIONS).set(count as f64);
}

/// `reason` is a [`RelayError::category`](crate::relay::RelayError::category)
/// or `no_route`.
pub fn record_rejection(reason: &'static str) {
    ::metrics::counter!(REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

pub fn record_backend_connect_failure() {
    ::metrics::counter!(BACKEND_CONNECT_FAILURES_TOTAL).increment(1);
}

pub fn record_direction(direction: &'static str, frames: u64, bytes: u64) {
    ::metrics::counter!(FRAMES_TOTAL, "direction" => direction).increment(frames);
    ::metrics::counter!(BYTES_TOTAL, "direction" => direction).increment(bytes);
}
