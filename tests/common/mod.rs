//! Shared utilities for integration tests.
//!
//! The test backend is a TLS WebSocket server on 127.0.0.1 using the
//! self-signed fixture certificate, so the relay's backend leg exercises
//! the same rustls path as in production.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as ServerMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use wss_relay::config::{RelayConfig, TlsConfig};
use wss_relay::lifecycle::Shutdown;
use wss_relay::net::connection::SessionTracker;
use wss_relay::net::tls::load_server_tls;
use wss_relay::RelayServer;

pub const WAIT: Duration = Duration::from_secs(5);

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

pub fn fixture_tls() -> TlsConfig {
    TlsConfig {
        cert_path: fixture("cert.pem"),
        key_path: fixture("key.pem"),
    }
}

/// What the backend observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Connected { id: String, protocol: Option<String> },
    Text { id: String, text: String },
    Binary { id: String, data: Vec<u8> },
    Closed { id: String, code: Option<u16> },
}

#[derive(Debug, Clone)]
enum BackendCommand {
    Send(ServerMessage),
    Close(u16, String),
}

#[derive(Clone)]
struct BackendState {
    events: mpsc::UnboundedSender<BackendEvent>,
    commands: broadcast::Sender<BackendCommand>,
    connections: Arc<AtomicUsize>,
}

/// Echoing TLS WebSocket backend at `wss://127.0.0.1:{port}/ws/{id}`.
/// Selects the `sip` subprotocol when the client offers it.
pub struct TestBackend {
    pub addr: SocketAddr,
    events: mpsc::UnboundedReceiver<BackendEvent>,
    commands: broadcast::Sender<BackendCommand>,
    connections: Arc<AtomicUsize>,
}

impl TestBackend {
    pub async fn start() -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (commands, _) = broadcast::channel(16);
        let connections = Arc::new(AtomicUsize::new(0));
        let state = BackendState {
            events: events_tx,
            commands: commands.clone(),
            connections: Arc::clone(&connections),
        };

        let app = Router::new()
            .route("/ws/{id}", get(backend_upgrade))
            .with_state(state);

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        let tls = load_server_tls(&fixture_tls()).unwrap();
        tokio::spawn(async move {
            let _ = axum_server::from_tcp_rustls(listener, tls)
                .serve(app.into_make_service())
                .await;
        });

        Self {
            addr,
            events,
            commands,
            connections,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Completed WebSocket handshakes so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn next_event(&mut self) -> BackendEvent {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for backend event")
            .expect("backend event channel closed")
    }

    /// Push a frame to every connected client.
    pub fn send(&self, message: ServerMessage) {
        let _ = self.commands.send(BackendCommand::Send(message));
    }

    /// Close every connected client with `code`.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.commands.send(BackendCommand::Close(code, reason.to_string()));
    }
}

async fn backend_upgrade(
    State(state): State<BackendState>,
    Path(id): Path<String>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade
        .protocols(["sip"])
        .on_upgrade(move |socket| serve_backend(socket, id, state))
}

async fn serve_backend(mut socket: WebSocket, id: String, state: BackendState) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let protocol = socket
        .protocol()
        .and_then(|p| p.to_str().ok())
        .map(str::to_owned);
    let _ = state.events.send(BackendEvent::Connected {
        id: id.clone(),
        protocol,
    });

    let mut commands = state.commands.subscribe();
    loop {
        tokio::select! {
            message = socket.recv() => match message {
                Some(Ok(ServerMessage::Text(text))) => {
                    let _ = state.events.send(BackendEvent::Text { id: id.clone(), text: text.as_str().to_owned() });
                    let _ = socket.send(ServerMessage::Text(text)).await;
                }
                Some(Ok(ServerMessage::Binary(data))) => {
                    let _ = state.events.send(BackendEvent::Binary { id: id.clone(), data: data.to_vec() });
                    let _ = socket.send(ServerMessage::Binary(data)).await;
                }
                Some(Ok(ServerMessage::Close(close))) => {
                    let _ = state.events.send(BackendEvent::Closed { id: id.clone(), code: close.map(|c| c.code) });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => {
                    let _ = state.events.send(BackendEvent::Closed { id: id.clone(), code: None });
                    break;
                }
            },
            command = commands.recv() => match command {
                Ok(BackendCommand::Send(message)) => {
                    let _ = socket.send(message).await;
                }
                Ok(BackendCommand::Close(code, reason)) => {
                    let _ = socket
                        .send(ServerMessage::Close(Some(CloseFrame { code, reason: reason.into() })))
                        .await;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// A relay serving plain `ws://` on an ephemeral port.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub sessions: SessionTracker,
}

impl TestRelay {
    pub async fn start(config: RelayConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let server = RelayServer::new(config, shutdown.clone()).unwrap();
        let sessions = server.sessions();
        tokio::spawn(server.run(listener));

        Self {
            addr,
            shutdown,
            sessions,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Relay configuration pointing at a local test backend.
pub fn relay_config(backend_port: u16) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.backend.host_template = "127.0.0.1".into();
    config.backend.port = backend_port;
    config.backend.path = "/ws/{id}".into();
    config.timeouts.backend_connect_secs = 2;
    config.timeouts.close_grace_secs = 2;
    config.timeouts.shutdown_drain_secs = 2;
    config
}

/// A port with nothing listening on it.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub async fn connect(url: &str) -> Result<WsClient, tungstenite::Error> {
    let (ws, _) = tokio_tungstenite::connect_async(url).await?;
    Ok(ws)
}

/// Connect offering the `sip` subprotocol; returns the protocol the relay selected.
pub async fn connect_sip(url: &str) -> Result<(WsClient, Option<String>), tungstenite::Error> {
    let mut request = url.into_client_request()?;
    request
        .headers_mut()
        .insert("sec-websocket-protocol", HeaderValue::from_static("sip"));
    let (ws, response) = tokio_tungstenite::connect_async(request).await?;
    let protocol = response
        .headers()
        .get("sec-websocket-protocol")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    Ok((ws, protocol))
}

/// Status code of a refused handshake.
pub fn refused_status(err: &tungstenite::Error) -> Option<u16> {
    match err {
        tungstenite::Error::Http(response) => Some(response.status().as_u16()),
        _ => None,
    }
}

pub async fn next_message(ws: &mut WsClient) -> Message {
    tokio::time::timeout(WAIT, ws.next())
        .await
        .expect("timed out waiting for message")
        .expect("stream ended")
        .expect("websocket error")
}

/// Keep reading after a Close so the reply goes out, until the relay hangs up.
pub async fn finish_close(ws: &mut WsClient) {
    while let Ok(Some(Ok(_))) = tokio::time::timeout(WAIT, ws.next()).await {}
}
