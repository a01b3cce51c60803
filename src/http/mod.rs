//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing, shutdown)
//!     → websocket.rs (GET /{prefix}/{id}: validate, admit, connect backend, upgrade)
//!     → responder.rs (GET /config/{id}, GET /health)
//! ```

pub mod responder;
pub mod server;
pub mod websocket;

pub use responder::{ClientRouting, HealthStatus};
pub use server::{AppState, RelayServer, ServerError};
