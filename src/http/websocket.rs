//! Client acceptor: WebSocket upgrade handling.
//!
//! # Responsibilities
//! - Validate the identifier before anything else
//! - Admit against the session limit
//! - Connect the backend, then complete the client upgrade
//! - Hand both connections to a relay session
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Relay ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Rejections are plain HTTP responses: no session, no backend attempt
//! - The backend is connected before the upgrade completes, so no client frame
//!   can arrive while the backend leg does not exist yet
//! - A failed backend still completes the upgrade and then closes the client
//!   with 1011, so browsers see a WebSocket close rather than a bare HTTP error
//! - A failed client upgrade closes the already-open backend with 1011

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::header::SEC_WEBSOCKET_PROTOCOL;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::backend::BackendLink;
use crate::http::server::AppState;
use crate::net::connection::SessionGuard;
use crate::observability::metrics;
use crate::relay::{Connection, RelayError, RelaySession};

/// `GET /{prefix}/{id}`
pub async fn relay_upgrade(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let client_id = match state.resolver.identify(&raw_id) {
        Ok(id) => id,
        Err(err) => return reject(StatusCode::BAD_REQUEST, peer, err),
    };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::debug!(peer = %peer, client_id = %client_id, "Not a WebSocket upgrade");
            return rejection.into_response();
        }
    };

    let guard = match state.sessions.try_admit() {
        Ok(guard) => guard,
        Err(err) => return reject(StatusCode::TOO_MANY_REQUESTS, peer, err),
    };

    let address = state.resolver.address_for(&client_id);
    let session = RelaySession::new(
        guard.id(),
        client_id.clone(),
        state.config.timeouts.close_grace(),
    );
    tracing::info!(
        session_id = %session.id(),
        client_id = %client_id,
        peer = %peer,
        backend = %address,
        active_sessions = state.sessions.active_count(),
        "Session starting"
    );
    metrics::record_session_started();

    let backend = state
        .connector
        .connect(&address, headers.get(SEC_WEBSOCKET_PROTOCOL))
        .await;

    let mut upgrade = upgrade;
    if let Ok(BackendLink {
        protocol: Some(protocol),
        ..
    }) = &backend
    {
        upgrade = upgrade.protocols([protocol.clone()]);
    }

    // Exactly one of the upgrade callbacks runs; it takes the session.
    let pending = Arc::new(Mutex::new(Some(Pending {
        session,
        backend,
        guard,
    })));
    let failed = Arc::clone(&pending);
    let shutdown = state.shutdown.subscribe();
    upgrade
        .on_failed_upgrade(move |err| {
            let Some(pending) = Pending::take(&failed) else {
                return;
            };
            tracing::warn!(session_id = %pending.session.id(), error = %err, "Client upgrade failed");
            tokio::spawn(async move {
                let _guard = pending.guard;
                let backend = pending.backend.ok().map(|link| link.connection);
                pending.session.abandon(backend).await;
            });
        })
        .on_upgrade(move |socket| async move {
            let Some(Pending { session, backend, guard }) = Pending::take(&pending) else {
                return;
            };
            // Slot is held until the session has closed both legs.
            let _guard = guard;
            let client = Connection::from_client(socket);
            match backend {
                Ok(link) => {
                    session.run(client, link.connection, shutdown).await;
                }
                Err(err) => {
                    session.reject(client, &err).await;
                }
            }
        })
}

/// A session waiting for the client upgrade to resolve.
struct Pending {
    session: RelaySession,
    backend: Result<BackendLink, RelayError>,
    guard: SessionGuard,
}

impl Pending {
    fn take(slot: &Mutex<Option<Pending>>) -> Option<Pending> {
        slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

fn reject(status: StatusCode, peer: SocketAddr, err: RelayError) -> Response {
    tracing::warn!(
        peer = %peer,
        category = err.category(),
        error = %err,
        status = status.as_u16(),
        "Upgrade rejected"
    );
    metrics::record_rejection(err.category());
    (status, err.to_string()).into_response()
}
