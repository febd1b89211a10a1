//! Skein transport layer.
//!
//! Encrypted, reliable, multiplexed sessions behind a small stable API.
//! The relay protocol only ever needs four things from a session: open a
//! stream, accept a stream, check whether the session is closed, close it.
//!
//! Two implementations ship here:
//!
//! - [`quic`]: QUIC via quinn, with a password-derived identity pinning both
//!   ends of the connection.
//! - [`memory`]: in-process sessions over `tokio::io::duplex`, for tests.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use skein_transport::{QuicConnector, Session, TransportConfig};
//! use tokio::io::AsyncWriteExt;
//!
//! # async fn example() -> Result<(), skein_transport::TransportError> {
//! let config = TransportConfig::new("127.0.0.1:7145".parse().unwrap())
//!     .password(b"test password")
//!     .salt(b"test salt");
//! let session = QuicConnector::connect(&config).await?;
//!
//! let mut stream = session.open_stream().await?;
//! stream.send.write_all(b"hello").await?;
//! stream.send.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod key;
pub mod memory;
pub mod quic;

pub use config::TransportConfig;
pub use error::TransportError;
pub use key::{derive_key, SessionIdentity};
pub use memory::{MemoryConnector, MemoryListener, MemorySession};
pub use quic::{QuicConnector, QuicListener, QuicSession};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

/// Write half of a stream.
pub type SendHalf = Box<dyn AsyncWrite + Send + Unpin>;

/// Read half of a stream.
pub type RecvHalf = Box<dyn AsyncRead + Send + Unpin>;

/// One ordered, independently closable byte channel within a session.
///
/// Shutting down `send` closes our direction only; the peer may still be
/// writing into `recv`.
pub struct Stream {
    pub send: SendHalf,
    pub recv: RecvHalf,
}

impl Stream {
    pub fn new(
        send: impl AsyncWrite + Send + Unpin + 'static,
        recv: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            send: Box::new(send),
            recv: Box::new(recv),
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").finish_non_exhaustive()
    }
}

/// A multiplexed session between two parties.
///
/// In production: [`QuicSession`]. In tests: [`MemorySession`].
#[async_trait::async_trait]
pub trait Session: Send + Sync + 'static {
    /// Open a new outbound stream.
    async fn open_stream(&self) -> Result<Stream, TransportError>;

    /// Wait for the next inbound stream opened by the peer.
    async fn accept_stream(&self) -> Result<Stream, TransportError>;

    /// Whether the session (either side) has been closed.
    fn is_closed(&self) -> bool;

    /// Close the whole session. Idempotent.
    fn close(&self);
}

/// Accepts incoming sessions on the server side.
#[async_trait::async_trait]
pub trait Listener: Send + 'static {
    /// Wait for the next established session.
    ///
    /// Peers that fail the handshake are skipped; an error here means the
    /// listener itself is unusable.
    async fn accept(&mut self) -> Result<Arc<dyn Session>, TransportError>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}

/// ALPN protocol identifier for Skein sessions.
pub const SKEIN_ALPN: &[u8] = b"skein/relay/1";
