//! TLS client configuration built from [`SslOptions`].

use std::sync::{Arc, OnceLock};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject as _;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use crate::error::{ErrorKind, TransferError};
use crate::options::{HttpVersion, SslOptions};

/// Platform trust anchors, loaded once per process.
fn native_roots() -> Arc<RootCertStore> {
    static ROOTS: OnceLock<Arc<RootCertStore>> = OnceLock::new();
    ROOTS
        .get_or_init(|| {
            let mut roots = RootCertStore::empty();
            let native = rustls_native_certs::load_native_certs();
            for error in &native.errors {
                tracing::warn!(%error, "failed to load some platform certificates");
            }
            let (added, ignored) = roots.add_parsable_certificates(native.certs);
            tracing::debug!(added, ignored, "loaded platform trust store");
            Arc::new(roots)
        })
        .clone()
}

fn bundle_roots(path: &std::path::Path) -> Result<RootCertStore, TransferError> {
    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_file_iter(path)
        .map_err(TransferError::msg(ErrorKind::Tls, "reading CA bundle"))?
    {
        let cert = cert.map_err(TransferError::msg(ErrorKind::Tls, "parsing CA bundle"))?;
        roots
            .add(cert)
            .map_err(TransferError::msg(ErrorKind::Tls, "adding CA certificate"))?;
    }
    Ok(roots)
}

pub(super) fn client_config(
    ssl: &SslOptions,
    version: HttpVersion,
) -> Result<Arc<ClientConfig>, TransferError> {
    let roots = match &ssl.ca_bundle {
        Some(path) => Arc::new(bundle_roots(path)?),
        None => native_roots(),
    };

    let builder = ClientConfig::builder().with_root_certificates(roots);
    let mut config = match (&ssl.client_cert, &ssl.client_key) {
        (Some(cert), Some(key)) => {
            let chain = CertificateDer::pem_file_iter(cert)
                .map_err(TransferError::msg(ErrorKind::Tls, "reading client certificate"))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(TransferError::msg(ErrorKind::Tls, "parsing client certificate"))?;
            let key = PrivateKeyDer::from_pem_file(key)
                .map_err(TransferError::msg(ErrorKind::Tls, "reading client key"))?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(TransferError::msg(ErrorKind::Tls, "client certificate"))?
        }
        _ => builder.with_no_client_auth(),
    };

    if !ssl.verify_peer {
        let provider = CryptoProvider::get_default().cloned().ok_or_else(|| {
            TransferError::new(ErrorKind::Tls, "no rustls crypto provider installed")
        })?;
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerification(provider)));
    }

    match version {
        HttpVersion::Http1 => config.alpn_protocols.push(b"http/1.1".to_vec()),
        HttpVersion::Auto | HttpVersion::Http2 | HttpVersion::Http2PriorKnowledge => {
            config.alpn_protocols.push(b"h2".to_vec());
            config.alpn_protocols.push(b"http/1.1".to_vec());
        }
    }

    Ok(Arc::new(config))
}

#[tracing::instrument(name = "tls", level = "trace", skip(config, stream))]
pub(super) async fn handshake(
    config: Arc<ClientConfig>,
    host: &str,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>, TransferError> {
    let domain = ServerName::try_from(host.to_owned())
        .map_err(TransferError::msg(ErrorKind::InvalidUrl, "invalid tls server name"))?;

    let stream = tokio_rustls::TlsConnector::from(config)
        .connect(domain, stream)
        .await
        .map_err(TransferError::msg(ErrorKind::Tls, "tls handshake"))?;

    tracing::trace!(
        alpn = ?stream.get_ref().1.alpn_protocol().map(String::from_utf8_lossy),
        "tls handshake complete"
    );
    Ok(stream)
}

/// Accepts any server certificate. Signatures are still checked so the handshake
/// itself stays well formed.
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
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
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
