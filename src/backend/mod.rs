//! Backend leg.
//!
//! # Data Flow
//! ```text
//! BackendAddress
//!     → connector.rs (TCP + TLS + WebSocket handshake, bounded by a timeout)
//!     → trust.rs (certificate policy for this leg only)
//!     → Connection handed to the relay session
//! ```
//!
//! # Design Decisions
//! - The relaxed verifier never touches the client-facing listener
//! - One `ClientConfig` is built at startup and shared by every connect

pub mod connector;
pub mod trust;

pub use connector::{BackendConnector, BackendLink};
pub use trust::{BackendTrust, TrustError};
