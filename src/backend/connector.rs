//! Backend connector.
//!
//! Opens the secure WebSocket leg to a resolved backend address. Every
//! failure mode (refused, TLS or WebSocket handshake rejected, timeout)
//! collapses into [`RelayError::BackendUnavailable`].

use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};

use crate::backend::trust::{BackendTrust, TrustError};
use crate::observability::metrics;
use crate::relay::{Connection, RelayError};
use crate::routing::BackendAddress;

/// An open backend leg.
pub struct BackendLink {
    pub connection: Connection,
    /// Subprotocol the backend selected, if any. Echoed to the client.
    pub protocol: Option<String>,
}

/// Shared, immutable connector. Cloned into each handler through `AppState`.
#[derive(Debug, Clone)]
pub struct BackendConnector {
    tls: Arc<ClientConfig>,
    connect_timeout: Duration,
}

impl BackendConnector {
    pub fn new(trust: &BackendTrust, connect_timeout: Duration) -> Result<Self, TrustError> {
        Ok(Self {
            tls: trust.client_config()?,
            connect_timeout,
        })
    }

    /// Connect to `address`, offering the client's requested subprotocols.
    pub async fn connect(
        &self,
        address: &BackendAddress,
        protocols: Option<&HeaderValue>,
    ) -> Result<BackendLink, RelayError> {
        let mut request = address
            .as_str()
            .into_client_request()
            .map_err(|err| unavailable(address, err.to_string()))?;
        if let Some(protocols) = protocols {
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocols.clone());
        }

        let connector = Connector::Rustls(Arc::clone(&self.tls));
        let attempt = connect_async_tls_with_config(request, None, true, Some(connector));

        let (stream, response) = match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(err)) => return Err(unavailable(address, err.to_string())),
            Err(_) => {
                return Err(unavailable(
                    address,
                    format!("no handshake within {}ms", self.connect_timeout.as_millis()),
                ))
            }
        };

        let protocol = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        tracing::debug!(
            backend = %address,
            status = response.status().as_u16(),
            protocol = protocol.as_deref().unwrap_or("-"),
            "Backend connected"
        );

        Ok(BackendLink {
            connection: Connection::from_wire(stream),
            protocol,
        })
    }
}

fn unavailable(address: &BackendAddress, reason: String) -> RelayError {
    metrics::record_backend_connect_failure();
    RelayError::BackendUnavailable {
        address: address.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::routing::BackendResolver;

    fn connector(timeout: Duration) -> BackendConnector {
        BackendConnector::new(&BackendTrust::AcceptInvalidCerts, timeout).unwrap()
    }

    fn resolver(port: u16) -> BackendResolver {
        let config = BackendConfig {
            host_template: "127.0.0.1".into(),
            port,
            path: "/ws/{id}".into(),
            ..BackendConfig::default()
        };
        BackendResolver::new(&config, 32)
    }

    #[tokio::test]
    async fn refused_connection_is_backend_unavailable() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let address = resolver(port).resolve("388").unwrap();

        let err = connector(Duration::from_secs(2))
            .connect(&address, None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::BackendUnavailable { .. }));
        assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    }

    #[tokio::test]
    async fn silent_backend_times_out() {
        // Accepts TCP but never answers the TLS handshake.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _hold = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        let address = resolver(port).resolve("388").unwrap();

        let started = std::time::Instant::now();
        let err = connector(Duration::from_millis(200))
            .connect(&address, None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::BackendUnavailable { ref reason, .. } if reason.contains("200ms")));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
