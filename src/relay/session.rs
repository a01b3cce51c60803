//! Relay session.
//!
//! # Data Flow
//! ```text
//! client leg ──frames──▶ forward(client → backend) ──▶ backend leg
//! client leg ◀──frames── forward(backend → client) ◀── backend leg
//!                    ▲                  ▲
//!                    └── closing flag ──┘ (watch channel, set once)
//! ```
//!
//! # Design Decisions
//! - Each direction awaits only its own leg; a stalled write never blocks
//!   the opposite direction
//! - The first loop to stop sets the closing flag; the other loop stops
//!   reading immediately
//! - Close frames are never forwarded by the loops themselves; teardown sends
//!   exactly one final frame per leg, derived from the first termination
//! - Ping/pong are forwarded like data; the relay sends no keepalives of its own

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, watch};

use crate::lifecycle::shutdown;
use crate::net::connection::SessionId;
use crate::observability::metrics;
use crate::relay::error::{Leg, RelayError};
use crate::relay::frame::{
    CloseReason, Connection, Frame, FrameSink, FrameStream, TransportError, CLOSE_GOING_AWAY,
    CLOSE_INTERNAL_ERROR,
};
use crate::relay::state::SessionState;
use crate::routing::identifier::ClientId;

/// Frame and byte counters for one direction. Advisory only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionStats {
    pub frames: u64,
    pub bytes: u64,
}

impl DirectionStats {
    fn record(&mut self, bytes: usize) {
        self.frames += 1;
        self.bytes += bytes as u64;
    }
}

/// What stopped the session first.
#[derive(Debug)]
pub enum Termination {
    /// The leg sent a Close frame.
    PeerClosed { leg: Leg, close: Option<CloseReason> },
    /// The leg's stream ended without a Close frame.
    Ended { leg: Leg },
    /// Reading from or writing to the leg failed.
    Failed { leg: Leg, error: TransportError },
    /// Administrative shutdown.
    Shutdown,
}

impl Termination {
    /// Final frame for each leg, as `(client, backend)`.
    fn final_frames(&self) -> (Option<Frame>, Option<Frame>) {
        match self {
            Termination::PeerClosed { leg, close } => {
                towards(leg.opposite(), Frame::Close(close.clone()))
            }
            Termination::Ended { leg } => towards(
                leg.opposite(),
                Frame::Close(Some(CloseReason::new(CLOSE_GOING_AWAY, "peer went away"))),
            ),
            Termination::Failed { leg, .. } => towards(
                leg.opposite(),
                Frame::Close(Some(CloseReason::new(CLOSE_INTERNAL_ERROR, "relay forwarding failed"))),
            ),
            Termination::Shutdown => {
                let close = Frame::Close(Some(CloseReason::new(CLOSE_GOING_AWAY, "relay shutting down")));
                (Some(close.clone()), Some(close))
            }
        }
    }

    fn end(&self) -> SessionEnd {
        match self {
            Termination::PeerClosed { leg, close } => SessionEnd::PeerClosed {
                leg: *leg,
                code: close.as_ref().map(|c| c.code),
            },
            Termination::Ended { leg } => SessionEnd::PeerClosed { leg: *leg, code: None },
            Termination::Failed { leg, .. } => SessionEnd::ForwardingFailure { leg: *leg },
            Termination::Shutdown => SessionEnd::Shutdown,
        }
    }

    fn into_error(self) -> Option<RelayError> {
        match self {
            Termination::PeerClosed { leg, .. } | Termination::Ended { leg } => {
                Some(RelayError::PeerClosed { leg })
            }
            Termination::Failed { leg, error } => {
                Some(RelayError::ForwardingFailure { leg, source: error })
            }
            Termination::Shutdown => None,
        }
    }
}

fn towards(leg: Leg, frame: Frame) -> (Option<Frame>, Option<Frame>) {
    match leg {
        Leg::Client => (Some(frame), None),
        Leg::Backend => (None, Some(frame)),
    }
}

/// How a session ended, as reported in its summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    PeerClosed { leg: Leg, code: Option<u16> },
    ForwardingFailure { leg: Leg },
    BackendUnavailable,
    /// The client's upgrade failed after the backend was dialled.
    UpgradeFailed,
    Shutdown,
}

/// Returned when a session reaches `Closed`.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub client_id: ClientId,
    pub duration: Duration,
    /// Client → backend.
    pub upstream: DirectionStats,
    /// Backend → client.
    pub downstream: DirectionStats,
    pub end: SessionEnd,
}

enum PumpExit {
    Terminated(Termination),
    Cancelled,
}

/// One client paired with one backend. Owns both legs and is solely
/// responsible for closing them.
#[derive(Debug)]
pub struct RelaySession {
    id: SessionId,
    client_id: ClientId,
    started: Instant,
    close_grace: Duration,
    state: watch::Sender<SessionState>,
}

impl RelaySession {
    /// Create a session in `Connecting`.
    pub fn new(id: SessionId, client_id: ClientId, close_grace: Duration) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            id,
            client_id,
            started: Instant::now(),
            close_grace,
            state,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Observe state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn advance(&self, next: SessionState) -> bool {
        let moved = self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::debug!(session_id = %self.id, state = %next, "Session state changed");
        }
        moved
    }

    /// Close a client whose backend could not be reached.
    pub async fn reject(self, client: Connection, error: &RelayError) -> SessionSummary {
        self.advance(SessionState::Closing);

        let last = Frame::Close(Some(CloseReason::new(CLOSE_INTERNAL_ERROR, "backend unavailable")));
        if tokio::time::timeout(self.close_grace, client.close(Some(last))).await.is_err() {
            tracing::warn!(session_id = %self.id, "Client did not close within grace period");
        }
        self.advance(SessionState::Closed);

        let duration = self.started.elapsed();
        tracing::warn!(
            session_id = %self.id,
            client_id = %self.client_id,
            category = error.category(),
            error = %error,
            duration_ms = duration.as_millis() as u64,
            "Session rejected"
        );
        metrics::record_session_finished(duration);

        SessionSummary {
            id: self.id,
            client_id: self.client_id,
            duration,
            upstream: DirectionStats::default(),
            downstream: DirectionStats::default(),
            end: SessionEnd::BackendUnavailable,
        }
    }

    /// End a session whose client never completed the upgrade, closing the
    /// backend if it was reached.
    pub async fn abandon(self, backend: Option<Connection>) -> SessionSummary {
        self.advance(SessionState::Closing);

        if let Some(backend) = backend {
            let last = Frame::Close(Some(CloseReason::new(CLOSE_INTERNAL_ERROR, "client upgrade failed")));
            if tokio::time::timeout(self.close_grace, backend.close(Some(last))).await.is_err() {
                tracing::warn!(session_id = %self.id, "Backend did not close within grace period");
            }
        }
        self.advance(SessionState::Closed);

        let duration = self.started.elapsed();
        tracing::warn!(
            session_id = %self.id,
            client_id = %self.client_id,
            duration_ms = duration.as_millis() as u64,
            "Session abandoned"
        );
        metrics::record_session_finished(duration);

        SessionSummary {
            id: self.id,
            client_id: self.client_id,
            duration,
            upstream: DirectionStats::default(),
            downstream: DirectionStats::default(),
            end: SessionEnd::UpgradeFailed,
        }
    }

    /// Relay frames until either leg terminates or shutdown is requested,
    /// then close both legs.
    pub async fn run(
        self,
        client: Connection,
        backend: Connection,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> SessionSummary {
        self.advance(SessionState::Active);
        tracing::debug!(session_id = %self.id, client_id = %self.client_id, "Session active");

        let Connection { frames: mut client_frames, sink: mut client_sink } = client;
        let Connection { frames: mut backend_frames, sink: mut backend_sink } = backend;
        let mut upstream = DirectionStats::default();
        let mut downstream = DirectionStats::default();

        let (closing, _) = watch::channel(false);
        // Returns true for the caller that flipped the flag.
        let begin_closing = || {
            let first = !closing.send_replace(true);
            if first {
                self.advance(SessionState::Closing);
            }
            first
        };

        let client_to_backend = async {
            let exit = forward(Leg::Client, &mut client_frames, &mut backend_sink, &closing, &mut upstream).await;
            (exit, begin_closing())
        };
        let backend_to_client = async {
            let exit = forward(Leg::Backend, &mut backend_frames, &mut client_sink, &closing, &mut downstream).await;
            (exit, begin_closing())
        };
        let shutdown_watch = async {
            let mut closed = closing.subscribe();
            tokio::select! {
                _ = shutdown::requested(&mut shutdown_rx) => {
                    begin_closing();
                }
                _ = closed.wait_for(|closing| *closing) => {}
            }
        };

        let ((up_exit, up_first), (down_exit, down_first), ()) =
            tokio::join!(client_to_backend, backend_to_client, shutdown_watch);

        // Only the loop that flipped the flag reports the cause; if neither
        // did, shutdown got there first.
        let cause = [(up_first, up_exit), (down_first, down_exit)]
            .into_iter()
            .find_map(|(first, exit)| match exit {
                PumpExit::Terminated(termination) if first => Some(termination),
                _ => None,
            })
            .unwrap_or(Termination::Shutdown);

        let client = Connection { frames: client_frames, sink: client_sink };
        let backend = Connection { frames: backend_frames, sink: backend_sink };
        let (client_last, backend_last) = cause.final_frames();
        // Each leg is done once its peer answers the close or the socket ends.
        let teardown = async {
            tokio::join!(client.close(client_last), backend.close(backend_last));
        };
        if tokio::time::timeout(self.close_grace, teardown).await.is_err() {
            tracing::warn!(
                session_id = %self.id,
                grace_ms = self.close_grace.as_millis() as u64,
                "Forced close after grace period"
            );
        }
        self.advance(SessionState::Closed);

        let duration = self.started.elapsed();
        let end = cause.end();
        self.log_end(cause, duration, upstream, downstream);
        metrics::record_session_finished(duration);
        metrics::record_direction("client_to_backend", upstream.frames, upstream.bytes);
        metrics::record_direction("backend_to_client", downstream.frames, downstream.bytes);

        SessionSummary {
            id: self.id,
            client_id: self.client_id,
            duration,
            upstream,
            downstream,
            end,
        }
    }

    fn log_end(
        &self,
        cause: Termination,
        duration: Duration,
        upstream: DirectionStats,
        downstream: DirectionStats,
    ) {
        let duration_ms = duration.as_millis() as u64;
        match cause.into_error() {
            Some(err @ RelayError::ForwardingFailure { .. }) => tracing::error!(
                session_id = %self.id,
                client_id = %self.client_id,
                category = err.category(),
                error = %err,
                duration_ms,
                upstream_frames = upstream.frames,
                downstream_frames = downstream.frames,
                "Session failed"
            ),
            Some(err) => tracing::info!(
                session_id = %self.id,
                client_id = %self.client_id,
                reason = %err,
                duration_ms,
                upstream_frames = upstream.frames,
                upstream_bytes = upstream.bytes,
                downstream_frames = downstream.frames,
                downstream_bytes = downstream.bytes,
                "Session closed"
            ),
            None => tracing::info!(
                session_id = %self.id,
                client_id = %self.client_id,
                duration_ms,
                "Session closed by shutdown"
            ),
        }
    }
}

/// Copy frames from `source` to `sink` until a termination or the closing flag.
async fn forward(
    from: Leg,
    source: &mut FrameStream,
    sink: &mut FrameSink,
    closing: &watch::Sender<bool>,
    stats: &mut DirectionStats,
) -> PumpExit {
    let mut cancelled = closing.subscribe();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancelled.wait_for(|closing| *closing) => return PumpExit::Cancelled,
            next = source.next() => next,
        };

        let frame = match next {
            Some(Ok(Frame::Close(close))) => {
                return PumpExit::Terminated(Termination::PeerClosed { leg: from, close });
            }
            Some(Ok(frame)) => frame,
            Some(Err(error)) => {
                return PumpExit::Terminated(Termination::Failed { leg: from, error });
            }
            None => return PumpExit::Terminated(Termination::Ended { leg: from }),
        };

        let len = frame.len();
        tokio::select! {
            biased;
            _ = cancelled.wait_for(|closing| *closing) => return PumpExit::Cancelled,
            sent = sink.send(frame) => {
                if let Err(error) = sent {
                    return PumpExit::Terminated(Termination::Failed { leg: from.opposite(), error });
                }
                stats.record(len);
            }
        }
    }
}
