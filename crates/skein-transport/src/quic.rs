//! QUIC sessions via quinn.
//!
//! Every party derives the same Ed25519 identity from the shared password
//! and salt (see [`SessionIdentity`]) and runs mutual TLS 1.3 pinned to it.
//! A peer with a different password presents a certificate nobody trusts
//! and the handshake fails before any stream is opened.
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use rustls::RootCertStore;

use crate::key::SessionIdentity;
use crate::{Listener, Session, Stream, TransportConfig, TransportError, SKEIN_ALPN};

/// A live QUIC connection; each stream is a bidirectional QUIC stream.
pub struct QuicSession {
    connection: quinn::Connection,
    // Client sessions own their endpoint; dropping it would kill the socket.
    _endpoint: Option<quinn::Endpoint>,
}

impl QuicSession {
    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }
}

impl std::fmt::Debug for QuicSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuicSession")
            .field("remote", &self.connection.remote_address())
            .finish()
    }
}

#[async_trait::async_trait]
impl Session for QuicSession {
    async fn open_stream(&self) -> Result<Stream, TransportError> {
        let (send, recv) = self.connection.open_bi().await.map_err(|e| {
            match TransportError::from(e) {
                TransportError::Accept(source) => TransportError::Open(source),
                other => other,
            }
        })?;
        Ok(Stream::new(send, recv))
    }

    async fn accept_stream(&self) -> Result<Stream, TransportError> {
        let (send, recv) = self.connection.accept_bi().await?;
        Ok(Stream::new(send, recv))
    }

    fn is_closed(&self) -> bool {
        self.connection.close_reason().is_some()
    }

    fn close(&self) {
        self.connection.close(quinn::VarInt::from_u32(0), b"closed");
    }
}

/// Server side: accepts QUIC connections from password holders.
pub struct QuicListener {
    endpoint: quinn::Endpoint,
}

impl QuicListener {
    /// Bind a QUIC endpoint on `config.addr`.
    pub fn bind(config: &TransportConfig) -> Result<Self, TransportError> {
        let server_config = server_config(config)?;
        let endpoint = quinn::Endpoint::server(server_config, config.addr)
            .map_err(|e| TransportError::Bind(e.into()))?;
        Ok(Self { endpoint })
    }

    /// Stop accepting and close every connection on this endpoint.
    pub fn close(&self) {
        self.endpoint.close(quinn::VarInt::from_u32(0), b"shutdown");
    }
}

#[async_trait::async_trait]
impl Listener for QuicListener {
    async fn accept(&mut self) -> Result<Arc<dyn Session>, TransportError> {
        loop {
            let incoming = self.endpoint.accept().await.ok_or(TransportError::Closed)?;
            let remote = incoming.remote_address();

            match incoming.await {
                Ok(connection) => {
                    tracing::debug!("quic: session established with {remote}");
                    return Ok(Arc::new(QuicSession {
                        connection,
                        _endpoint: None,
                    }));
                }
                Err(e) => {
                    tracing::warn!("quic: handshake with {remote} failed: {e}");
                }
            }
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.endpoint.local_addr()?)
    }
}

/// Client side: dials a [`QuicListener`].
pub struct QuicConnector;

impl QuicConnector {
    /// Connect to `config.addr` and complete the handshake.
    pub async fn connect(config: &TransportConfig) -> Result<Arc<QuicSession>, TransportError> {
        let bind: SocketAddr = if config.addr.is_ipv6() {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        };

        let mut endpoint =
            quinn::Endpoint::client(bind).map_err(|e| TransportError::Bind(e.into()))?;
        endpoint.set_default_client_config(client_config(config)?);

        let connect_err = |source: anyhow::Error| TransportError::Connect {
            addr: config.addr,
            source,
        };
        let connection = endpoint
            .connect(config.addr, &config.server_name)
            .map_err(|e| connect_err(e.into()))?
            .await
            .map_err(|e| connect_err(e.into()))?;

        tracing::debug!("quic: connected to {}", config.addr);
        Ok(Arc::new(QuicSession {
            connection,
            _endpoint: Some(endpoint),
        }))
    }
}

// ── TLS / transport setup ───────────────────────────────────────────

fn tls_err(e: impl std::error::Error + Send + Sync + 'static) -> TransportError {
    TransportError::Tls(e.into())
}

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn pinned_roots(identity: &SessionIdentity) -> Result<Arc<RootCertStore>, TransportError> {
    let mut roots = RootCertStore::empty();
    roots.add(identity.cert()).map_err(tls_err)?;
    Ok(Arc::new(roots))
}

fn quic_transport(config: &TransportConfig) -> Result<Arc<quinn::TransportConfig>, TransportError> {
    let mut transport = quinn::TransportConfig::default();
    if let Some(timeout) = config.max_idle_timeout {
        let timeout = quinn::IdleTimeout::try_from(timeout)
            .map_err(|e| TransportError::Config(format!("idle timeout: {e}")))?;
        transport.max_idle_timeout(Some(timeout));
    }
    transport.keep_alive_interval(config.keep_alive);
    Ok(Arc::new(transport))
}

fn server_config(config: &TransportConfig) -> Result<quinn::ServerConfig, TransportError> {
    let identity = SessionIdentity::from_config(config)?;
    let provider = provider();

    let verifier = rustls::server::WebPkiClientVerifier::builder_with_provider(
        pinned_roots(&identity)?,
        provider.clone(),
    )
    .build()
    .map_err(tls_err)?;

    let mut tls = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(tls_err)?
        .with_client_cert_verifier(verifier)
        .with_single_cert(vec![identity.cert()], identity.private_key())
        .map_err(tls_err)?;
    tls.alpn_protocols = vec![SKEIN_ALPN.to_vec()];

    let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls).map_err(tls_err)?;
    let mut server = quinn::ServerConfig::with_crypto(Arc::new(crypto));
    server.transport_config(quic_transport(config)?);
    Ok(server)
}

fn client_config(config: &TransportConfig) -> Result<quinn::ClientConfig, TransportError> {
    let identity = SessionIdentity::from_config(config)?;

    let mut tls = rustls::ClientConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(tls_err)?
        .with_root_certificates(pinned_roots(&identity)?)
        .with_client_auth_cert(vec![identity.cert()], identity.private_key())
        .map_err(tls_err)?;
    tls.alpn_protocols = vec![SKEIN_ALPN.to_vec()];

    let crypto = quinn::crypto::rustls::QuicClientConfig::try_from(tls).map_err(tls_err)?;
    let mut client = quinn::ClientConfig::new(Arc::new(crypto));
    client.transport_config(quic_transport(config)?);
    Ok(client)
}
