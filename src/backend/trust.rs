//! Certificate policy for the backend leg.
//!
//! Backends typically present self-signed or internally issued certificates,
//! so the default policy skips chain and hostname verification. The handshake
//! signature is still checked, so the backend must hold the key for the
//! certificate it presents.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use thiserror::Error;

use crate::config::{BackendConfig, TrustMode};
use crate::net::tls::{self, TlsError};

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("trust = \"custom_ca\" requires backend.ca_path")]
    MissingCaPath,

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Resolved trust policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTrust {
    AcceptInvalidCerts,
    CustomCa { ca_path: PathBuf },
}

impl BackendTrust {
    pub fn from_config(config: &BackendConfig) -> Result<Self, TrustError> {
        match config.trust {
            TrustMode::AcceptInvalidCerts => Ok(BackendTrust::AcceptInvalidCerts),
            TrustMode::CustomCa => config
                .ca_path
                .clone()
                .map(|ca_path| BackendTrust::CustomCa { ca_path })
                .ok_or(TrustError::MissingCaPath),
        }
    }

    /// Build the rustls client configuration for this policy.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, TrustError> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(TlsError::from)?;

        let config = match self {
            BackendTrust::AcceptInvalidCerts => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new(provider)))
                .with_no_client_auth(),
            BackendTrust::CustomCa { ca_path } => builder
                .with_root_certificates(load_roots(ca_path)?)
                .with_no_client_auth(),
        };
        Ok(Arc::new(config))
    }
}

fn load_roots(path: &Path) -> Result<RootCertStore, TrustError> {
    let mut roots = RootCertStore::empty();
    for cert in tls::load_certs(path)? {
        roots.add(cert).map_err(TlsError::from)?;
    }
    tracing::debug!(ca_path = ?path, roots = roots.len(), "Backend CA bundle loaded");
    Ok(roots)
}

/// Accepts any certificate chain and host name, but still verifies the
/// handshake signature with the provider's algorithms.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl AcceptAnyServerCert {
    fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
    }

    #[test]
    fn relaxed_policy_is_the_default() {
        let trust = BackendTrust::from_config(&BackendConfig::default()).unwrap();
        assert_eq!(trust, BackendTrust::AcceptInvalidCerts);
        assert!(trust.client_config().is_ok());
    }

    #[test]
    fn custom_ca_requires_a_path() {
        let config = BackendConfig {
            trust: TrustMode::CustomCa,
            ca_path: None,
            ..BackendConfig::default()
        };
        assert!(matches!(BackendTrust::from_config(&config), Err(TrustError::MissingCaPath)));
    }

    #[test]
    fn custom_ca_loads_bundle() {
        let trust = BackendTrust::CustomCa {
            ca_path: fixture("ca.pem"),
        };
        assert!(trust.client_config().is_ok());
    }

    #[test]
    fn missing_bundle_is_an_error() {
        let trust = BackendTrust::CustomCa {
            ca_path: fixture("nope.pem"),
        };
        assert!(matches!(
            trust.client_config(),
            Err(TrustError::Tls(TlsError::NotFound { .. }))
        ));
    }

    #[test]
    fn relaxed_verifier_accepts_unknown_certificate() {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let verifier = AcceptAnyServerCert::new(provider);
        let cert = tls::load_certs(&fixture("cert.pem")).unwrap().remove(0);
        let name = ServerName::try_from("backend-388.example.net").unwrap();

        assert!(verifier
            .verify_server_cert(&cert, &[], &name, &[], UnixTime::now())
            .is_ok());
        assert!(!verifier.supported_verify_schemes().is_empty());
    }
}
