//! wss-relay
//!
//! Terminates a trusted TLS WebSocket from a browser signaling client and
//! relays it, frame for frame, to a backend whose certificate the browser
//! would refuse.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────────────┐
//!                   │                        RELAY                          │
//!  Browser          │  ┌─────────┐   ┌──────────┐   ┌──────────┐            │
//!  wss://…/proxy/388┼─▶│   net   │──▶│   http   │──▶│ routing  │            │
//!                   │  │listener │   │ acceptor │   │ resolver │            │
//!                   │  │  + tls  │   └────┬─────┘   └────┬─────┘            │
//!                   │  └─────────┘        │              ▼                  │
//!                   │                     │        ┌──────────┐             │
//!                   │                     │        │ backend  │  relaxed    │
//!                   │                     │        │connector │──trust──────┼──▶ Backend
//!                   │                     ▼        └────┬─────┘             │    wss://backend-388…
//!                   │               ┌────────────────────┴──┐               │
//!  Browser ◀────────┼───────────────│  relay session         │◀─────────────┼─── Backend
//!                   │               │  two forwarding loops  │               │
//!                   │               └────────────────────────┘               │
//!                   │  config · lifecycle · observability (cross-cutting)    │
//!                   └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use wss_relay::config::load_config;
use wss_relay::lifecycle::{signals, Shutdown};
use wss_relay::net;
use wss_relay::observability::{logging, metrics};
use wss_relay::RelayServer;

#[derive(Debug, Parser)]
#[command(name = "wss-relay", version, about = "Secure WebSocket relay for SIP-over-WebSocket clients")]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            // Logging is configured from this file, so it is not up yet.
            eprintln!("wss-relay: {err}");
            return Err(err.into());
        }
    };

    logging::init_logging(&config.observability)?;

    tracing::info!("wss-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        proxy_enabled = config.proxy.enabled,
        path_prefix = %config.proxy.path_prefix,
        max_sessions = config.proxy.max_sessions,
        backend_host = %config.backend.host_template,
        backend_port = config.backend.port,
        trust = ?config.backend.trust,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = match net::bind(&config.listener).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, "Failed to bind listener");
            return Err(err.into());
        }
    };

    let drain = config.timeouts.shutdown_drain();
    let shutdown = Shutdown::new();
    let server = RelayServer::new(config, shutdown.clone())?;
    let sessions = server.sessions();
    let mut server_task = tokio::spawn(server.run(listener));

    tokio::select! {
        _ = signals::wait_for_signal() => {}
        result = &mut server_task => {
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "Server failed");
                    Err(err.into())
                }
                Err(err) => Err(err.into()),
            };
        }
    }

    shutdown.trigger();

    if !sessions.wait_until_idle(drain).await {
        tracing::warn!(
            remaining = sessions.active_count(),
            "Sessions still open after drain deadline"
        );
    }
    match tokio::time::timeout(drain, server_task).await {
        Ok(Ok(Err(err))) => tracing::error!(error = %err, "Server stopped with error"),
        Ok(Err(err)) => tracing::error!(error = %err, "Server task panicked"),
        Err(_) => tracing::warn!("Server did not stop within drain deadline"),
        Ok(Ok(Ok(()))) => {}
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
