//! Client TLS material and rustls configurations

use crate::error::{Result, SenderError};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Client certificate chain and private key loaded from PEM files.
pub struct TlsMaterial {
    cert_path: PathBuf,
    key_path: PathBuf,
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl TlsMaterial {
    /// Load a certificate chain and private key from PEM files
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let fail = |reason: String| SenderError::configuration(cert_path, key_path, reason);

        let cert_file = File::open(cert_path)
            .map_err(|e| fail(format!("open certificate: {}", e)))?;
        let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| fail(format!("parse certificate: {}", e)))?;
        if certs.is_empty() {
            return Err(fail("no certificate found in PEM file".to_string()));
        }

        let key_file = File::open(key_path).map_err(|e| fail(format!("open key: {}", e)))?;
        let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
            .map_err(|e| fail(format!("parse key: {}", e)))?
            .ok_or_else(|| fail("no private key found in PEM file".to_string()))?;

        Ok(Self {
            cert_path: cert_path.to_path_buf(),
            key_path: key_path.to_path_buf(),
            certs,
            key,
        })
    }

    pub fn certificate_count(&self) -> usize {
        self.certs.len()
    }

    /// Client configuration presenting this certificate while accepting any
    /// server certificate. No CA set is configured.
    pub fn into_insecure_client_config(self) -> Result<ClientConfig> {
        let verifier = AcceptAnyServerCert::new();
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_client_auth_cert(self.certs, self.key)
            .map_err(|e| SenderError::configuration(self.cert_path, self.key_path, e))
    }
}

/// Verified client configuration for `wss` destinations, trusting the
/// platform root store. Unreadable roots leave the store empty, so the
/// handshake fails at connect time rather than at construction.
pub fn web_client_config() -> ClientConfig {
    let mut roots = RootCertStore::empty();
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let (added, ignored) = roots.add_parsable_certificates(certs);
            tracing::debug!(added, ignored, "Loaded native root certificates");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not load native root certificates");
        }
    }

    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth()
}

/// Accepts every server certificate. Handshake signatures are still
/// checked so the peer must hold the key for the certificate it sent.
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyServerCert {
    fn new() -> Self {
        Self {
            algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        }
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
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
