//! Relay error taxonomy.

use std::fmt;

use thiserror::Error;

use crate::relay::frame::TransportError;
use crate::routing::identifier::IdentifierError;

/// One of the two connections composing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    Client,
    Backend,
}

impl Leg {
    pub fn opposite(self) -> Self {
        match self {
            Leg::Client => Leg::Backend,
            Leg::Backend => Leg::Client,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Leg::Client => "client",
            Leg::Backend => "backend",
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the acceptor, connector and session.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed or missing identifier; rejected during the handshake.
    #[error("invalid client identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),

    /// Backend connect refused, failed the TLS/WebSocket handshake, or timed out.
    #[error("backend {address} unavailable: {reason}")]
    BackendUnavailable { address: String, reason: String },

    /// Normal termination by one side; propagated to the other side.
    #[error("{leg} closed the connection")]
    PeerClosed { leg: Leg },

    /// Mid-session I/O error on one leg.
    #[error("forwarding failed on {leg} leg: {source}")]
    ForwardingFailure {
        leg: Leg,
        #[source]
        source: TransportError,
    },

    /// Concurrent session limit reached.
    #[error("session limit of {limit} reached")]
    AdmissionRejected { limit: u64 },
}

impl RelayError {
    /// Stable label for log fields and metric labels.
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::InvalidIdentifier(_) => "invalid_identifier",
            RelayError::BackendUnavailable { .. } => "backend_unavailable",
            RelayError::PeerClosed { .. } => "peer_closed",
            RelayError::ForwardingFailure { .. } => "forwarding_failure",
            RelayError::AdmissionRejected { .. } => "admission_rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legs_are_opposites() {
        assert_eq!(Leg::Client.opposite(), Leg::Backend);
        assert_eq!(Leg::Backend.opposite(), Leg::Client);
    }

    #[test]
    fn admission_and_identifier_have_distinct_categories() {
        let admission = RelayError::AdmissionRejected { limit: 4 };
        let identifier = RelayError::from(IdentifierError::Empty);
        assert_ne!(admission.category(), identifier.category());
        assert_eq!(admission.to_string(), "session limit of 4 reached");
    }
}
