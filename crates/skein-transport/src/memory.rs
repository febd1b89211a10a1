//! In-process sessions for tests and simulations.
//!
//! Each stream is a `tokio::io::duplex` pipe; opening a stream hands the
//! far end to the peer over a channel. Both ends of a session share one
//! cancellation token, so closing (or dropping) either side closes both.
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::io::DuplexStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{Listener, Session, Stream, TransportError};

/// Bytes buffered per stream direction before writers wait.
const STREAM_BUFFER: usize = 64 * 1024;

/// Streams the peer may open before we accept them.
const PENDING_STREAMS: usize = 64;

fn split(pipe: DuplexStream) -> Stream {
    let (recv, send) = tokio::io::split(pipe);
    Stream::new(send, recv)
}

/// One end of an in-memory session.
pub struct MemorySession {
    incoming: Mutex<mpsc::Receiver<DuplexStream>>,
    outgoing: mpsc::Sender<DuplexStream>,
    closed: CancellationToken,
}

impl MemorySession {
    /// Two connected ends of a fresh session.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(PENDING_STREAMS);
        let (b_tx, b_rx) = mpsc::channel(PENDING_STREAMS);
        let closed = CancellationToken::new();

        let a = Self {
            incoming: Mutex::new(a_rx),
            outgoing: b_tx,
            closed: closed.clone(),
        };
        let b = Self {
            incoming: Mutex::new(b_rx),
            outgoing: a_tx,
            closed,
        };
        (a, b)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

#[async_trait::async_trait]
impl Session for MemorySession {
    async fn open_stream(&self) -> Result<Stream, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let (local, remote) = tokio::io::duplex(STREAM_BUFFER);
        tokio::select! {
            _ = self.closed.cancelled() => Err(TransportError::Closed),
            sent = self.outgoing.send(remote) => {
                sent.map_err(|_| TransportError::Closed)?;
                Ok(split(local))
            }
        }
    }

    async fn accept_stream(&self) -> Result<Stream, TransportError> {
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => Err(TransportError::Closed),
            pipe = incoming.recv() => pipe.map(split).ok_or(TransportError::Closed),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.outgoing.is_closed()
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

/// Server side of the in-memory transport.
pub struct MemoryListener {
    sessions: mpsc::Receiver<MemorySession>,
}

/// Client side of the in-memory transport. Cheap to clone.
#[derive(Clone)]
pub struct MemoryConnector {
    sessions: mpsc::Sender<MemorySession>,
}

impl MemoryListener {
    pub fn new() -> (Self, MemoryConnector) {
        let (tx, rx) = mpsc::channel(PENDING_STREAMS);
        (Self { sessions: rx }, MemoryConnector { sessions: tx })
    }
}

impl MemoryConnector {
    /// Establish a session with the listener.
    pub async fn connect(&self) -> Result<Arc<MemorySession>, TransportError> {
        let (client, server) = MemorySession::pair();
        self.sessions
            .send(server)
            .await
            .map_err(|_| TransportError::Closed)?;
        Ok(Arc::new(client))
    }
}

#[async_trait::async_trait]
impl Listener for MemoryListener {
    async fn accept(&mut self) -> Result<Arc<dyn Session>, TransportError> {
        let session = self.sessions.recv().await.ok_or(TransportError::Closed)?;
        Ok(Arc::new(session))
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok((Ipv4Addr::LOCALHOST, 0).into())
    }
}
