//! Relay core: one session per client, two legs per session.
//!
//! # Data Flow
//! ```text
//! frame.rs   both legs adapted to one Frame / Connection shape
//! session.rs two forwarding loops, coordinated teardown
//! state.rs   Connecting → Active → Closing → Closed
//! error.rs   failure taxonomy shared with acceptor and connector
//! ```

pub mod error;
pub mod frame;
pub mod session;
pub mod state;

pub use error::{Leg, RelayError};
pub use frame::{CloseReason, Connection, Frame, TransportError};
pub use session::{DirectionStats, RelaySession, SessionEnd, SessionSummary};
pub use state::SessionState;
