//! Session state machine.
//!
//! ```text
//! Connecting ──▶ Active ──▶ Closing ──▶ Closed
//!      │                       ▲
//!      └───────────────────────┘   (backend unavailable, upgrade failed)
//! ```

use std::fmt;

/// Lifecycle state of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Backend connect in progress.
    Connecting,
    /// Both legs open, frames flowing.
    Active,
    /// First termination signal seen; forwarding stopped, legs being closed.
    Closing,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Whether `next` is a legal successor. No path reaches `Closed`
    /// without passing through `Closing`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Active) | (Connecting, Closing) | (Active, Closing) | (Closing, Closed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
