//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind)
//!     → tls.rs (server certificate, optional)
//!     → connection.rs (admission against max_sessions, session IDs)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Admission is counted per relay session, not per TCP connection
//! - TLS is optional: a plain listener is allowed behind a TLS-terminating load balancer

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{SessionGuard, SessionId, SessionTracker};
pub use listener::{bind, ListenerError};
pub use tls::{load_server_tls, TlsError};
