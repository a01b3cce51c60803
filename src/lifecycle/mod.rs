//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → stop accepting → sessions send Close (1001) → drain → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every session and the server subscribe
//! - Drain has a deadline: sessions still open after it are dropped

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
