//! TLS client setup shared by the probe and bandwidth phases.
//!
//! Target servers are multi-tenant front ends sharing one certificate, so the
//! client classifies by certificate content rather than identity. The verifier
//! below accepts any chain (still checking it against the pinned roots and
//! tracing the outcome) while handshake signatures are verified for real.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use thiserror::Error;
use tokio_rustls::TlsConnector;

use frontscan_common::debug;
use tracing::trace;

#[derive(Debug, Error)]
pub enum TlsSetupError {
    #[error("failed to read CA bundle {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no usable certificate in CA bundle {0}")]
    EmptyBundle(PathBuf),
    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("invalid server name '{0}'")]
    ServerName(String),
}

/// Loads the pinned CA bundle. Fails when the file holds no parsable certificate.
pub fn load_roots(path: &Path) -> Result<RootCertStore, TlsSetupError> {
    let read_err = |source| TlsSetupError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(read_err)?;
    let mut reader = BufReader::new(file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, std::io::Error>>()
        .map_err(read_err)?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    debug!("CA bundle {}: {added} roots loaded, {ignored} ignored", path.display());

    if roots.is_empty() {
        return Err(TlsSetupError::EmptyBundle(path.to_path_buf()));
    }
    Ok(roots)
}

/// Builds the connector used by every probe of the run.
pub fn build_connector(roots: RootCertStore) -> Result<TlsConnector, TlsSetupError> {
    let provider: Arc<CryptoProvider> = Arc::new(ring::default_provider());
    let verifier = SubjectOnlyVerifier::new(roots, provider.clone());

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Name presented to the server: the SNI when configured, the bare address otherwise.
pub fn server_name(addr: std::net::IpAddr, sni: Option<&str>) -> Result<ServerName<'static>, TlsSetupError> {
    match sni {
        Some(name) => ServerName::try_from(name.to_string())
            .map_err(|_| TlsSetupError::ServerName(name.to_string())),
        None => Ok(ServerName::IpAddress(addr.into())),
    }
}

#[derive(Debug)]
struct SubjectOnlyVerifier {
    chain: Option<Arc<WebPkiServerVerifier>>,
    provider: Arc<CryptoProvider>,
}

impl SubjectOnlyVerifier {
    fn new(roots: RootCertStore, provider: Arc<CryptoProvider>) -> Self {
        let chain = if roots.is_empty() {
            None
        } else {
            WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                .build()
                .ok()
        };
        Self { chain, provider }
    }
}

impl ServerCertVerifier for SubjectOnlyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if let Some(chain) = &self.chain
            && let Err(e) =
                chain.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            trace!("chain not trusted for {server_name:?}: {e}");
        }
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

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
