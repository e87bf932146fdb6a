//! TLS certificate introspection for http monitors (spec §4.2).
//!
//! `reqwest`'s rustls backend does not expose the peer certificate chain,
//! so certificate facts are gathered with a dedicated raw TLS handshake
//! over `tokio-rustls`, independent of the request itself. Two handshakes
//! are attempted in sequence:
//!
//!  1. A normal handshake using the platform's trusted-roots verifier
//!     (`webpki-roots`). If it succeeds, the chain is trusted and we parse
//!     the leaf certificate's `notAfter` out of the verified chain.
//!  2. If (1) fails for any TLS reason (expired, unknown CA, hostname
//!     mismatch, ...), a second handshake is made with a verifier that
//!     accepts any certificate, purely so the leaf certificate bytes can
//!     still be captured and `notAfter` reported — per spec §4.2,
//!     "`ssl_expires_at` is set from `notAfter` when available regardless
//!     of `success`".
//!
//! The permissive verifier is never used to decide `success`/`ssl_valid` —
//! only to recover certificate facts after a failed trusted handshake.

use crate::error::ProbeError;
use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

pub struct TlsFacts {
    pub ssl_valid: bool,
    pub ssl_expires_at: Option<DateTime<Utc>>,
}

/// Classification of *why* a trusted handshake failed, mapped to the
/// canonical failure-taxonomy subcategories in spec §4.2.
fn classify_handshake_error(err: &std::io::Error) -> ProbeError {
    let msg = err.to_string().to_lowercase();
    if msg.contains("expired") {
        ProbeError::TlsExpired
    } else if msg.contains("unknownissuer") || msg.contains("unknown issuer") || msg.contains("invalidcertificate") {
        ProbeError::TlsUnknownCa
    } else if msg.contains("notvalidforname") || msg.contains("hostname") {
        ProbeError::TlsHostnameMismatch
    } else {
        ProbeError::TlsOther
    }
}

/// A verifier that records the leaf certificate it observed but always
/// accepts, so the handshake can complete even against an untrusted or
/// expired chain. Used only for the capture pass described above — never
/// to determine `ssl_valid`.
#[derive(Debug)]
struct CapturingVerifier {
    captured: Mutex<Option<Vec<u8>>>,
}

impl CapturingVerifier {
    fn new() -> Arc<Self> {
        Arc::new(CapturingVerifier { captured: Mutex::new(None) })
    }
}

impl ServerCertVerifier for CapturingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        *self.captured.lock().unwrap() = Some(end_entity.as_ref().to_vec());
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        // Accept anything; we never act on the signature, only the chain.
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

fn leaf_not_after(der: &[u8]) -> Option<DateTime<Utc>> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).ok()?;
    let ts = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(ts, 0)
}

fn trusted_root_config() -> ClientConfig {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    ClientConfig::builder().with_root_certificates(roots).with_no_client_auth()
}

fn permissive_config(verifier: Arc<CapturingVerifier>) -> ClientConfig {
    ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth()
}

/// Connect to `host:443` (or `host:port` if supplied) and gather
/// certificate facts. Returns `Err` only when no certificate could be
/// observed at all (e.g. the TCP connection itself failed); a failed
/// *trusted* handshake is not an error here — it is reported through
/// `ssl_valid = false` with facts recovered from the permissive pass.
pub async fn inspect(host: &str, port: u16, timeout: Duration) -> Result<TlsFacts, ProbeError> {
    let server_name = ServerName::try_from(host.to_string()).map_err(|_| ProbeError::TlsHostnameMismatch)?;
    let addr = format!("{host}:{port}");

    let trusted_result = tokio::time::timeout(timeout, async {
        let stream = TcpStream::connect(&addr).await.map_err(|_| ProbeError::ConnectTimeout)?;
        let connector = TlsConnector::from(Arc::new(trusted_root_config()));
        connector
            .connect(server_name.clone(), stream)
            .await
            .map_err(|e| classify_handshake_error(&e))
    })
    .await
    .map_err(|_| ProbeError::ConnectTimeout)?;

    match trusted_result {
        Ok(tls_stream) => {
            let (_, conn) = tls_stream.get_ref();
            let der = conn
                .peer_certificates()
                .and_then(|certs| certs.first())
                .map(|c| c.as_ref().to_vec());
            Ok(TlsFacts {
                ssl_valid: true,
                ssl_expires_at: der.as_deref().and_then(leaf_not_after),
            })
        }
        Err(handshake_err) => {
            // Trusted handshake failed — retry permissively to recover
            // certificate facts for reporting, without trusting the chain.
            let verifier = CapturingVerifier::new();
            let permissive = tokio::time::timeout(timeout, async {
                let stream = TcpStream::connect(&addr).await.map_err(|_| ProbeError::ConnectTimeout)?;
                let connector = TlsConnector::from(Arc::new(permissive_config(verifier.clone())));
                connector.connect(server_name.clone(), stream).await.map_err(|_| ProbeError::TlsOther)
            })
            .await;

            let captured = verifier.captured.lock().unwrap().clone();
            match permissive {
                Ok(Ok(_)) | Ok(Err(_)) if captured.is_some() => Ok(TlsFacts {
                    ssl_valid: false,
                    ssl_expires_at: captured.as_deref().and_then(leaf_not_after),
                }),
                _ => Err(handshake_err),
            }
        }
    }
}
