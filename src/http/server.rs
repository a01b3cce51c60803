//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID)
//! - Serve over TLS (or plain TCP) on the bound listener
//! - Stop accepting and drain on shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use axum_server::Handle;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::backend::{BackendConnector, BackendTrust, TrustError};
use crate::config::RelayConfig;
use crate::http::{responder, websocket};
use crate::lifecycle::{shutdown, Shutdown};
use crate::net::connection::SessionTracker;
use crate::net::tls::{load_server_tls, TlsError};
use crate::observability::metrics;
use crate::routing::BackendResolver;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub resolver: Arc<BackendResolver>,
    pub connector: BackendConnector,
    pub sessions: SessionTracker,
    pub shutdown: Shutdown,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("backend trust: {0}")]
    Trust(#[from] TrustError),

    #[error("listener TLS: {0}")]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// HTTP server for the relay.
pub struct RelayServer {
    router: Router,
    config: Arc<RelayConfig>,
    sessions: SessionTracker,
    shutdown: Shutdown,
}

impl RelayServer {
    /// Build the server. Fails if the backend trust policy cannot be loaded.
    pub fn new(config: RelayConfig, shutdown: Shutdown) -> Result<Self, ServerError> {
        let config = Arc::new(config);
        let trust = BackendTrust::from_config(&config.backend)?;
        let connector = BackendConnector::new(&trust, config.timeouts.backend_connect())?;
        let resolver = Arc::new(BackendResolver::new(
            &config.backend,
            config.proxy.max_identifier_len,
        ));
        let sessions = SessionTracker::new(config.proxy.max_sessions);

        let state = AppState {
            config: Arc::clone(&config),
            resolver,
            connector,
            sessions: sessions.clone(),
            shutdown: shutdown.clone(),
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            sessions,
            shutdown,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &RelayConfig, state: AppState) -> Router {
        let relay_path = format!("/{}/{{id}}", config.proxy.path_prefix);

        Router::new()
            .route(&relay_path, get(websocket::relay_upgrade))
            .route("/config/{id}", get(responder::client_config))
            .route("/health", get(responder::health))
            .fallback(no_route)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Session tracker shared with the handlers.
    pub fn sessions(&self) -> SessionTracker {
        self.sessions.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// shutdown is triggered.
    pub async fn run(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        let listener = listener.into_std()?;

        let handle = Handle::new();
        let drain = self.config.timeouts.shutdown_drain();
        let mut shutdown_rx = self.shutdown.subscribe();
        let signal_handle = handle.clone();
        tokio::spawn(async move {
            shutdown::requested(&mut shutdown_rx).await;
            tracing::info!(drain_secs = drain.as_secs(), "HTTP server draining");
            signal_handle.graceful_shutdown(Some(drain));
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        match &self.config.listener.tls {
            Some(tls) => {
                let rustls = load_server_tls(tls)?;
                tracing::info!(address = %addr, "Relay listening (wss)");
                axum_server::from_tcp_rustls(listener, rustls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
            None => {
                tracing::warn!(
                    address = %addr,
                    "Relay listening without TLS; browsers need a TLS terminator in front"
                );
                axum_server::from_tcp(listener).handle(handle).serve(app).await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Everything else, including `/{prefix}/` with no identifier and
/// `/{prefix}/a/b`.
async fn no_route(State(state): State<AppState>, uri: Uri) -> Response {
    let prefix = format!("/{}", state.config.proxy.path_prefix);
    let path = uri.path();
    if path == prefix || path.starts_with(&format!("{prefix}/")) {
        tracing::warn!(path = %path, category = "no_route", "Upgrade rejected");
        metrics::record_rejection("no_route");
    }
    (StatusCode::NOT_FOUND, "no route").into_response()
}
