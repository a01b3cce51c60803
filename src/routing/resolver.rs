//! Backend address resolution.
//!
//! # Responsibilities
//! - Validate the client identifier
//! - Substitute it into the configured `wss://` template
//!
//! # Design Decisions
//! - Pure and deterministic: no I/O, no DNS
//! - Host, port and path come from configuration; only `{id}` is untrusted,
//!   and it is restricted to `[A-Za-z0-9]`, so it cannot redirect to another host

use std::fmt;

use crate::config::schema::BackendConfig;
use crate::relay::RelayError;
use crate::routing::identifier::ClientId;

/// Placeholder replaced by the client identifier.
pub const ID_PLACEHOLDER: &str = "{id}";

/// A resolved backend WebSocket URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAddress(String);

impl BackendAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps client identifiers to backend addresses. Immutable after startup.
#[derive(Debug, Clone)]
pub struct BackendResolver {
    host_template: String,
    port: u16,
    path_template: String,
    max_identifier_len: usize,
}

impl BackendResolver {
    pub fn new(config: &BackendConfig, max_identifier_len: usize) -> Self {
        Self {
            host_template: config.host_template.clone(),
            port: config.port,
            path_template: config.path.clone(),
            max_identifier_len,
        }
    }

    /// Validate a raw identifier.
    pub fn identify(&self, raw: &str) -> Result<ClientId, RelayError> {
        Ok(ClientId::parse(raw, self.max_identifier_len)?)
    }

    /// Validate `raw` and build its backend address.
    pub fn resolve(&self, raw: &str) -> Result<BackendAddress, RelayError> {
        let id = self.identify(raw)?;
        Ok(self.address_for(&id))
    }

    /// Build the backend address of an already validated identifier.
    pub fn address_for(&self, id: &ClientId) -> BackendAddress {
        let host = self.host_template.replace(ID_PLACEHOLDER, id.as_str());
        let path = self.path_template.replace(ID_PLACEHOLDER, id.as_str());
        BackendAddress(format!("wss://{}:{}{}", host, self.port, path))
    }
}
