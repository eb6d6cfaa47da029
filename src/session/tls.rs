//! TLS handshake unit
//!
//! Performs client-side TLS handshakes over already-connected streams.
//! One connector serves every connection of a manager; hostname and port
//! vary per call because the multiplexer dials many targets.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::rustls::{self, pki_types::ServerName, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::common::{IntoStream, Result, Stream};
use crate::error::Error;

/// Certificate-trust policy for client handshakes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustPolicy {
    /// Verify the certificate chain and hostname
    #[default]
    Strict,
    /// Accept any certificate chain and skip hostname verification.
    /// Explicit opt-in for legacy/self-signed deployments only.
    TrustAll,
}

/// TLS configuration
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Certificate-trust policy
    pub trust_policy: TrustPolicy,
    /// ALPN protocols
    pub alpn: Vec<String>,
}

/// TLS session performing client handshakes over existing streams
pub struct TlsSession {
    connector: TlsConnector,
}

impl TlsSession {
    pub fn new(config: TlsConfig) -> Self {
        Self {
            connector: Self::build_connector(&config),
        }
    }

    fn build_connector(config: &TlsConfig) -> TlsConnector {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let mut tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if !config.alpn.is_empty() {
            tls_config.alpn_protocols = config
                .alpn
                .iter()
                .map(|s| s.as_bytes().to_vec())
                .collect();
        }

        if config.trust_policy == TrustPolicy::TrustAll {
            tls_config
                .dangerous()
                .set_certificate_verifier(Arc::new(AcceptAnyCertificate));
        }

        TlsConnector::from(Arc::new(tls_config))
    }

    /// Perform a client handshake over `stream`, using `host` for SNI and
    /// certificate identity. On failure the stream is consumed and
    /// dropped, so no half-secured connection survives.
    pub async fn wrap_client(&self, stream: Stream, host: &str, port: u16) -> Result<Stream> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| Error::Tls(format!("invalid server name: {}:{}", host, port)))?;

        let tls_stream = self
            .connector
            .connect(server_name, StreamAdapter(stream))
            .await
            .map_err(|e| Error::Tls(e.to_string()))?;
        Ok(tls_stream.into_stream())
    }
}

/// Adapter so a boxed Stream satisfies the connector's IO bounds
struct StreamAdapter(Stream);

impl AsyncRead for StreamAdapter {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for StreamAdapter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut *self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.0).poll_shutdown(cx)
    }
}

/// Certificate verifier for the TrustAll policy
#[derive(Debug)]
struct AcceptAnyCertificate;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_policy_defaults_to_strict() {
        assert_eq!(TrustPolicy::default(), TrustPolicy::Strict);
        assert_eq!(TlsConfig::default().trust_policy, TrustPolicy::Strict);
    }

    #[test]
    fn test_trust_policy_serde_names() {
        let policy: TrustPolicy = serde_json::from_str("\"trust_all\"").unwrap();
        assert_eq!(policy, TrustPolicy::TrustAll);
        assert_eq!(serde_json::to_string(&TrustPolicy::Strict).unwrap(), "\"strict\"");
    }

    #[test]
    fn test_connector_builds_for_both_policies() {
        let _ = TlsSession::new(TlsConfig::default());
        let _ = TlsSession::new(TlsConfig {
            trust_policy: TrustPolicy::TrustAll,
            alpn: vec!["h2".into(), "http/1.1".into()],
        });
    }

    #[tokio::test]
    async fn test_invalid_server_name_fails_before_io() {
        let session = TlsSession::new(TlsConfig::default());
        let (client, _server) = tokio::io::duplex(64);

        let result = session.wrap_client(client.into_stream(), "not a hostname", 443).await;
        assert!(matches!(result, Err(Error::Tls(_))));
    }
}
