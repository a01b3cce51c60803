//! Session admission and lifetime tracking.
//!
//! # Responsibilities
//! - Generate unique session IDs for tracing
//! - Gate admission on the concurrent-session limit (backpressure)
//! - Release the slot when the session ends, even on panic
//!
//! The active count is the only mutable state shared between sessions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;
use crate::relay::RelayError;

/// Global atomic counter for session IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}

/// Tracks active sessions against a fixed limit.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    /// Current count of active sessions.
    active_count: Arc<AtomicU64>,
    /// Admission limit.
    limit: u64,
}

impl SessionTracker {
    pub fn new(limit: u64) -> Self {
        Self {
            active_count: Arc::new(AtomicU64::new(0)),
            limit,
        }
    }

    /// Claim a session slot. The returned guard releases it on drop.
    pub fn try_admit(&self) -> Result<SessionGuard, RelayError> {
        let mut current = self.active_count.load(Ordering::SeqCst);
        loop {
            if current >= self.limit {
                return Err(RelayError::AdmissionRejected { limit: self.limit });
            }
            match self.active_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        metrics::set_active_sessions(current + 1);
        Ok(SessionGuard {
            active_count: Arc::clone(&self.active_count),
            id: SessionId::new(),
        })
    }

    /// Get current active session count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every session has released its slot, or `deadline` passes.
    /// Returns true if the tracker drained.
    pub async fn wait_until_idle(&self, deadline: Duration) -> bool {
        let drained = async {
            while self.active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(deadline, drained).await.is_ok()
    }
}

/// Guard that holds one admission slot for a session's lifetime.
#[derive(Debug)]
pub struct SessionGuard {
    active_count: Arc<AtomicU64>,
    id: SessionId,
}

impl SessionGuard {
    /// Get this session's ID.
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let remaining = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_sessions(remaining);
        tracing::trace!(session_id = %self.id, "Session slot released");
    }
}
