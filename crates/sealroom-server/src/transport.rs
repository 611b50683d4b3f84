//! QUIC transport.
//!
//! One bidirectional stream per connection carries frames both ways. TLS
//! material comes from PEM files when both paths are given, otherwise a
//! self-signed certificate for `localhost` is generated at startup.

use std::{net::SocketAddr, path::Path, sync::Arc};

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::error::ServerError;

/// ALPN protocol identifier.
pub const ALPN: &[u8] = b"sealroom/1";

/// A QUIC connection accepted by the transport.
pub type QuinnConnection = quinn::Connection;

/// Listening QUIC endpoint.
pub struct QuinnTransport {
    endpoint: quinn::Endpoint,
    certificate: CertificateDer<'static>,
}

impl QuinnTransport {
    /// Bind a server endpoint.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Config`] for an unparsable address, unreadable PEM
    ///   files, or only one of `cert_path`/`key_path`
    /// - [`ServerError::Transport`] if the socket cannot be bound
    pub fn bind(
        bind_address: &str,
        cert_path: Option<&Path>,
        key_path: Option<&Path>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = bind_address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address {bind_address}: {e}")))?;

        let (chain, key) = match (cert_path, key_path) {
            (Some(cert), Some(key)) => load_pem(cert, key)?,
            (None, None) => self_signed()?,
            _ => {
                return Err(ServerError::Config(
                    "--cert and --key must be given together".to_string(),
                ));
            },
        };

        let certificate = chain
            .first()
            .cloned()
            .ok_or_else(|| ServerError::Config("certificate file contains no certificates".into()))?;

        let mut crypto = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| ServerError::Config(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|e| ServerError::Config(format!("invalid certificate: {e}")))?;
        crypto.alpn_protocols = vec![ALPN.to_vec()];

        let quic = quinn::crypto::rustls::QuicServerConfig::try_from(crypto)
            .map_err(|e| ServerError::Config(e.to_string()))?;
        let server_config = quinn::ServerConfig::with_crypto(Arc::new(quic));

        let endpoint = quinn::Endpoint::server(server_config, addr)?;

        Ok(Self { endpoint, certificate })
    }

    /// Wait for the next connection to complete its QUIC handshake.
    ///
    /// Returns `None` once the endpoint is closed.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] if the handshake failed.
    pub async fn accept(&self) -> Result<Option<QuinnConnection>, ServerError> {
        let Some(incoming) = self.endpoint.accept().await else {
            return Ok(None);
        };

        incoming.await.map(Some).map_err(|e| ServerError::Transport(e.to_string()))
    }

    /// Address the endpoint is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Leaf certificate presented to clients.
    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.certificate
    }

    /// Stop accepting and close every connection.
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"shutdown");
    }
}

/// Load a certificate chain and private key from PEM files.
///
/// # Errors
///
/// Returns [`ServerError::Config`] if either file cannot be read or parsed.
pub fn load_pem(
    cert_path: &Path,
    key_path: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), ServerError> {
    let cert_pem = std::fs::read(cert_path)
        .map_err(|e| ServerError::Config(format!("reading {}: {e}", cert_path.display())))?;
    let key_pem = std::fs::read(key_path)
        .map_err(|e| ServerError::Config(format!("reading {}: {e}", key_path.display())))?;

    let chain = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("parsing {}: {e}", cert_path.display())))?;
    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::Config(format!("parsing {}: {e}", key_path.display())))?
        .ok_or_else(|| {
            ServerError::Config(format!("no private key found in {}", key_path.display()))
        })?;

    Ok((chain, key))
}

fn self_signed() -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), ServerError> {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .map_err(|e| ServerError::Internal(format!("generating certificate: {e}")))?;

    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    Ok((vec![cert.der().clone()], key))
}
