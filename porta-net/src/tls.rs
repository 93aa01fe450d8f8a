//! TLS client configuration for STARTTLS upgrades
//!
//! Uses rustls 0.23 with the ring provider.
//!
//! # Verifiers
//!
//! - [`CertificatePolicy::Verify`]: WebPKI validation against the Mozilla root set
//! - [`CertificatePolicy::SkipVerify`]: accepts any server certificate but still
//!   checks handshake signatures

use crate::{ImapError, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// How the server certificate is checked during STARTTLS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificatePolicy {
    Verify,
    SkipVerify,
}

impl CertificatePolicy {
    pub fn from_verify_flag(verify: bool) -> Self {
        if verify {
            CertificatePolicy::Verify
        } else {
            CertificatePolicy::SkipVerify
        }
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(ring::default_provider())
}

/// Build a connector for `policy`, trusting the bundled WebPKI roots
pub fn connector(policy: CertificatePolicy) -> Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    connector_with_roots(policy, roots)
}

/// Build a connector for `policy` with an explicit root store
pub fn connector_with_roots(
    policy: CertificatePolicy,
    roots: RootCertStore,
) -> Result<TlsConnector> {
    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| ImapError::Tls(format!("unable to select protocol versions: {}", e)))?;

    let config = match policy {
        CertificatePolicy::Verify => builder.with_root_certificates(roots).with_no_client_auth(),
        CertificatePolicy::SkipVerify => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertificateVerification::new()))
            .with_no_client_auth(),
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Server name for SNI and certificate matching
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| ImapError::Tls(format!("invalid server name {:?}: {}", host, e)))
}

/// Accepts every certificate chain.
///
/// Only the chain is trusted blindly; TLS 1.2/1.3 handshake signatures are
/// still verified against the presented certificate.
#[derive(Debug)]
pub struct NoCertificateVerification {
    provider: Arc<CryptoProvider>,
}

impl NoCertificateVerification {
    pub fn new() -> Self {
        NoCertificateVerification { provider: provider() }
    }
}

impl Default for NoCertificateVerification {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
