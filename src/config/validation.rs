//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, limits > 0)
//! - Check the backend template yields a well-formed `wss://` URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{RelayConfig, TrustMode};
use crate::routing::identifier::DNS_LABEL_MAX;
use crate::routing::resolver::ID_PLACEHOLDER;

/// Paths served next to the upgrade endpoint; the prefix may not shadow them.
const RESERVED_PREFIXES: &[&str] = &["config", "health"];

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check every semantic constraint and collect all failures.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let prefix = &config.proxy.path_prefix;
    if prefix.is_empty() || prefix.contains('/') {
        errors.push(ValidationError::new(
            "proxy.path_prefix",
            "must be a single non-empty path segment",
        ));
    } else if RESERVED_PREFIXES.contains(&prefix.as_str()) {
        errors.push(ValidationError::new(
            "proxy.path_prefix",
            format!("'{prefix}' is reserved"),
        ));
    }

    if config.proxy.max_sessions == 0 {
        errors.push(ValidationError::new("proxy.max_sessions", "must be greater than 0"));
    }

    let max_len = config.proxy.max_identifier_len;
    if max_len == 0 || max_len > DNS_LABEL_MAX {
        errors.push(ValidationError::new(
            "proxy.max_identifier_len",
            format!("must be between 1 and {DNS_LABEL_MAX}"),
        ));
    }

    match Url::parse(&config.proxy.public_url) {
        Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
        _ => errors.push(ValidationError::new(
            "proxy.public_url",
            format!("'{}' is not a ws:// or wss:// URL", config.proxy.public_url),
        )),
    }

    validate_backend(config, &mut errors);

    if config.timeouts.backend_connect_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.backend_connect_secs",
            "must be greater than 0",
        ));
    }
    if config.timeouts.close_grace_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.close_grace_secs",
            "must be greater than 0",
        ));
    }
    if config.timeouts.shutdown_drain_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.shutdown_drain_secs",
            "must be greater than 0",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_backend(config: &RelayConfig, errors: &mut Vec<ValidationError>) {
    let backend = &config.backend;

    if !backend.host_template.contains(ID_PLACEHOLDER) && !backend.path.contains(ID_PLACEHOLDER) {
        errors.push(ValidationError::new(
            "backend.host_template",
            format!("'{ID_PLACEHOLDER}' must appear in host_template or path"),
        ));
    }
    if backend.host_template.contains(['/', ':', '@', '?', '#']) {
        errors.push(ValidationError::new(
            "backend.host_template",
            "must be a bare host name",
        ));
    }
    if !backend.path.starts_with('/') {
        errors.push(ValidationError::new("backend.path", "must start with '/'"));
    }
    if backend.port == 0 {
        errors.push(ValidationError::new("backend.port", "must be greater than 0"));
    }

    // A probe identifier must produce a parseable URL with a host.
    let probe = format!(
        "wss://{}:{}{}",
        backend.host_template.replace(ID_PLACEHOLDER, "probe0"),
        backend.port,
        backend.path.replace(ID_PLACEHOLDER, "probe0"),
    );
    match Url::parse(&probe) {
        Ok(url) if url.host().is_some() => {}
        _ => errors.push(ValidationError::new(
            "backend.host_template",
            format!("template does not produce a valid URL (probe: {probe})"),
        )),
    }

    if backend.trust == TrustMode::CustomCa && backend.ca_path.is_none() {
        errors.push(ValidationError::new(
            "backend.ca_path",
            "required when trust = \"custom_ca\"",
        ));
    }
}
