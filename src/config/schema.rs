//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Client-facing listener (bind address, TLS).
    pub listener: ListenerConfig,

    /// Client acceptor and routing toggle.
    pub proxy: ProxySettings,

    /// Backend address template and trust policy.
    pub backend: BackendConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// TLS for the client-facing leg. Browsers require a publicly trusted
    /// certificate here; plain listeners are only for use behind a TLS
    /// terminator.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Settings for the client acceptor and the configuration responder.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// When false, the configuration responder advertises the direct backend
    /// address instead of the proxy path. The relay keeps serving either way.
    pub enabled: bool,

    /// First path segment of the upgrade endpoint (`/{path_prefix}/{id}`).
    pub path_prefix: String,

    /// Externally reachable base URL of this relay (e.g. "wss://relay.example.net").
    pub public_url: String,

    /// Maximum concurrent relay sessions (backpressure).
    pub max_sessions: u64,

    /// Maximum accepted client identifier length.
    pub max_identifier_len: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path_prefix: "proxy".to_string(),
            public_url: "wss://localhost:8443".to_string(),
            max_sessions: 1000,
            max_identifier_len: 32,
        }
    }
}

/// How the backend leg validates the server certificate.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrustMode {
    /// Skip chain and hostname verification (self-signed backends).
    #[default]
    AcceptInvalidCerts,
    /// Verify against the CA bundle at `ca_path`.
    CustomCa,
}

/// Backend address template and trust policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Host template; `{id}` is replaced by the client identifier.
    pub host_template: String,

    /// Backend port.
    pub port: u16,

    /// Path on the backend, may also contain `{id}`.
    pub path: String,

    /// Certificate validation policy for the backend leg only.
    pub trust: TrustMode,

    /// CA bundle (PEM) used when `trust = "custom_ca"`.
    pub ca_path: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host_template: "backend-{id}.example.net".to_string(),
            port: 8089,
            path: "/ws".to_string(),
            trust: TrustMode::AcceptInvalidCerts,
            ca_path: None,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub backend_connect_secs: u64,

    /// Upper bound for closing both legs once a session starts closing.
    pub close_grace_secs: u64,

    /// How long the server waits for connections to drain on shutdown.
    pub shutdown_drain_secs: u64,
}

impl TimeoutConfig {
    pub fn backend_connect(&self) -> Duration {
        Duration::from_secs(self.backend_connect_secs)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_secs(self.close_grace_secs)
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            backend_connect_secs: 5,
            close_grace_secs: 5,
            shutdown_drain_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [backend]
            host_template = "sip-{id}.pbx.internal"
            trust = "custom_ca"
            ca_path = "/etc/relay/ca.pem"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.host_template, "sip-{id}.pbx.internal");
        assert_eq!(config.backend.trust, TrustMode::CustomCa);
        assert_eq!(config.backend.port, 8089);
        assert_eq!(config.proxy.path_prefix, "proxy");
        assert!(config.proxy.enabled);
        assert!(config.listener.tls.is_none());
        assert_eq!(config.timeouts.backend_connect(), Duration::from_secs(5));
    }

    #[test]
    fn log_format_parses_snake_case() {
        let config: RelayConfig = toml::from_str(
            r#"
            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
