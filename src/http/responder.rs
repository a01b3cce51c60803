//! Configuration responder and health endpoint.
//!
//! Browser clients ask `/config/{id}` where to connect. With the proxy
//! enabled they are sent through the relay; otherwise straight to the
//! backend. The answer never changes how the relay itself behaves.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::config::ProxySettings;
use crate::http::server::AppState;
use crate::routing::{BackendResolver, ClientId};

/// Where a client should open its WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRouting {
    pub proxied: bool,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub active_sessions: u64,
}

pub fn routing_for(proxy: &ProxySettings, resolver: &BackendResolver, id: &ClientId) -> ClientRouting {
    if proxy.enabled {
        ClientRouting {
            proxied: true,
            url: format!(
                "{}/{}/{}",
                proxy.public_url.trim_end_matches('/'),
                proxy.path_prefix,
                id
            ),
        }
    } else {
        ClientRouting {
            proxied: false,
            url: resolver.address_for(id).to_string(),
        }
    }
}

/// `GET /config/{id}`
pub async fn client_config(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    match state.resolver.identify(&raw_id) {
        Ok(id) => Json(routing_for(&state.config.proxy, &state.resolver, &id)).into_response(),
        Err(err) => {
            tracing::debug!(error = %err, "Config lookup rejected");
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        active_sessions: state.sessions.active_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    fn resolver() -> BackendResolver {
        BackendResolver::new(&BackendConfig::default(), 32)
    }

    #[test]
    fn proxied_url_points_at_relay() {
        let proxy = ProxySettings {
            public_url: "wss://relay.example.org/".into(),
            ..ProxySettings::default()
        };
        let id = ClientId::parse("388", 32).unwrap();

        let routing = routing_for(&proxy, &resolver(), &id);
        assert_eq!(
            routing,
            ClientRouting {
                proxied: true,
                url: "wss://relay.example.org/proxy/388".into(),
            }
        );
    }

    #[test]
    fn direct_url_points_at_backend() {
        let proxy = ProxySettings {
            enabled: false,
            ..ProxySettings::default()
        };
        let id = ClientId::parse("388", 32).unwrap();

        let routing = routing_for(&proxy, &resolver(), &id);
        assert!(!routing.proxied);
        assert_eq!(routing.url, "wss://backend-388.example.net:8089/ws");
    }

    #[test]
    fn routing_serializes_as_flat_json() {
        let routing = ClientRouting {
            proxied: true,
            url: "wss://r/proxy/7".into(),
        };
        let json = serde_json::to_value(&routing).unwrap();
        assert_eq!(json, serde_json::json!({"proxied": true, "url": "wss://r/proxy/7"}));
    }
}
