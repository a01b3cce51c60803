//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Upgrade path /{prefix}/{id}
//!     → identifier.rs (validate id)
//!     → resolver.rs (substitute into wss:// template)
//!     → BackendAddress handed to the backend connector
//! ```
//!
//! # Design Decisions
//! - Template compiled from config at startup, immutable at runtime
//! - Deterministic: same identifier always yields the same address

pub mod identifier;
pub mod resolver;

pub use identifier::{ClientId, IdentifierError};
pub use resolver::{BackendAddress, BackendResolver};
