//! Relay client.
//!
//! A [`Client`] owns the accept loop for pushed messages; a [`Requester`]
//! (cloned out of the client before [`Client::run`]) issues requests from
//! any other task.
//!
//! ```no_run
//! use skein_protocol::{Client, ClientConfig, WILDCARD};
//! use skein_transport::{QuicConnector, TransportConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = TransportConfig::new("127.0.0.1:9000".parse()?).password(b"secret");
//! let session = QuicConnector::connect(&transport).await?;
//!
//! let client = Client::new(session, ClientConfig::default())
//!     .on(WILDCARD, |_, msg| println!("{} from {}", msg.event, msg.sender))
//!     .on_connect(|requester| {
//!         let requester = requester.clone();
//!         tokio::spawn(async move { requester.send_all("hello", "hi all").await });
//!     });
//! client.run().await?;
//! # Ok(())
//! # }
//! ```

mod events;
mod requester;

use std::sync::Arc;
use std::time::Duration;

use skein_transport::{Session, Stream, TransportError};

use crate::error::{ProtocolError, WireError};
use crate::types::Message;
use crate::wire::{self, PacketType, WireLimits};

pub use events::{EventRouter, WILDCARD};
pub use requester::Requester;

/// Client tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Idle deadline for each wait on a pushed message. `None` waits forever.
    pub accept_timeout: Option<Duration>,
    pub limits: WireLimits,
}

impl ClientConfig {
    pub fn accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = Some(timeout);
        self
    }

    pub fn limits(mut self, limits: WireLimits) -> Self {
        self.limits = limits;
        self
    }
}

type LifecycleHook = Box<dyn Fn(&Requester) + Send + Sync>;

/// A connected relay client.
pub struct Client {
    requester: Requester,
    accept_timeout: Option<Duration>,
    router: EventRouter<Requester>,
    on_connect: Option<LifecycleHook>,
    on_disconnect: Option<LifecycleHook>,
}

impl Client {
    pub fn new(session: Arc<dyn Session>, config: ClientConfig) -> Self {
        Self {
            requester: Requester::new(session, config.limits),
            accept_timeout: config.accept_timeout,
            router: EventRouter::new(),
            on_connect: None,
            on_disconnect: None,
        }
    }

    /// Handle messages named `event`; [`WILDCARD`] handles all of them.
    ///
    /// Handlers run on the accept loop. Spawn a task for anything slow.
    pub fn on(
        mut self,
        event: impl Into<String>,
        handler: impl Fn(&Requester, &Message) + Send + Sync + 'static,
    ) -> Self {
        self.router.on(event, handler);
        self
    }

    /// Called once, after the handshake assigned our identifier.
    pub fn on_connect(mut self, hook: impl Fn(&Requester) + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Box::new(hook));
        self
    }

    /// Called once when [`Client::run`] returns.
    pub fn on_disconnect(mut self, hook: impl Fn(&Requester) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Box::new(hook));
        self
    }

    /// A request handle sharing this client's session.
    pub fn requester(&self) -> Requester {
        self.requester.clone()
    }

    /// Handshake, then deliver pushed messages until the session ends.
    ///
    /// Returns `Ok` when the session was closed through
    /// [`Requester::disconnect`]; any other ending is an error.
    pub async fn run(self) -> Result<(), ProtocolError> {
        let result = self.serve().await;

        self.requester.session().close();
        match &result {
            Ok(()) => tracing::info!("client {} disconnected", self.requester.id()),
            Err(e) => tracing::info!("client {} disconnected: {e}", self.requester.id()),
        }
        if let Some(hook) = &self.on_disconnect {
            hook(&self.requester);
        }
        result
    }

    async fn serve(&self) -> Result<(), ProtocolError> {
        let id = self.requester.handshake().await?;
        tracing::info!("connected as client {id}");
        if let Some(hook) = &self.on_connect {
            hook(&self.requester);
        }

        loop {
            let stream = match crate::accept_next(
                self.requester.session().as_ref(),
                self.accept_timeout,
            )
            .await
            {
                Ok(stream) => stream,
                Err(TransportError::Closed) if self.requester.closed_locally() => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            let Stream { mut recv, .. } = stream;
            match wire::read_packet(&mut recv).await {
                Ok(PacketType::Message) => {}
                Ok(packet) => {
                    tracing::debug!("ignoring unexpected {packet:?} stream from server");
                    continue;
                }
                Err(WireError::UnknownPacket(tag)) => {
                    tracing::debug!("ignoring stream with unknown packet type {tag}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let message = Message::read_body(&mut recv, self.requester.limits()).await?;
            let handled = self.router.route(&self.requester, &message);
            tracing::debug!(
                "'{}' from {}: {handled} handler(s)",
                message.event,
                message.sender
            );
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("requester", &self.requester)
            .field("events", &self.router)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use skein_transport::MemorySession;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::types::ClientId;

    /// Answer the handshake with `id` on the far end of a session.
    async fn greet(server: &MemorySession, id: u32) {
        let mut stream = server.accept_stream().await.unwrap();
        assert_eq!(
            wire::read_packet(&mut stream.recv).await.unwrap(),
            PacketType::GetId
        );
        stream.send.write_all(&id.to_le_bytes()).await.unwrap();
        stream.send.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn hooks_fire_once_and_local_disconnect_is_ok() {
        let (client_side, server) = MemorySession::pair();
        let connects = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));

        let c = connects.clone();
        let d = disconnects.clone();
        let client = Client::new(Arc::new(client_side), ClientConfig::default())
            .on_connect(move |requester| {
                assert_eq!(requester.id(), ClientId::new(4));
                c.fetch_add(1, Ordering::SeqCst);
                requester.disconnect();
            })
            .on_disconnect(move |_| {
                d.fetch_add(1, Ordering::SeqCst);
            });

        let run = tokio::spawn(client.run());
        greet(&server, 4).await;

        run.await.unwrap().unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_push_is_fatal() {
        let (client_side, server) = MemorySession::pair();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let d = disconnects.clone();
        let client = Client::new(Arc::new(client_side), ClientConfig::default())
            .on_disconnect(move |_| {
                d.fetch_add(1, Ordering::SeqCst);
            });

        let run = tokio::spawn(client.run());
        greet(&server, 1).await;

        // MESSAGE tag, then a name length with no name behind it.
        let mut stream = server.open_stream().await.unwrap();
        stream.send.write_all(&[3, 9, 0, 0, 0]).await.unwrap();
        stream.send.shutdown().await.unwrap();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, ProtocolError::Wire(_)));
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_push_tag_is_skipped() {
        let (client_side, server) = MemorySession::pair();
        let (tx, mut seen) = tokio::sync::mpsc::unbounded_channel();
        let client = Client::new(Arc::new(client_side), ClientConfig::default()).on(
            WILDCARD,
            move |requester, message| {
                let _ = tx.send(message.clone());
                requester.disconnect();
            },
        );

        let run = tokio::spawn(client.run());
        greet(&server, 1).await;

        // A tag this client does not know, with a body it cannot parse.
        let mut stream = server.open_stream().await.unwrap();
        stream.send.write_all(&[5, 0xde, 0xad]).await.unwrap();
        stream.send.shutdown().await.unwrap();

        // A known tag that never travels server to client.
        let mut stream = server.open_stream().await.unwrap();
        stream.send.write_all(&[4]).await.unwrap();
        stream.send.shutdown().await.unwrap();

        let message = Message::new("after", ClientId::new(2), vec![1u8]);
        let mut stream = server.open_stream().await.unwrap();
        message.write_to(&mut stream.send).await.unwrap();
        stream.send.shutdown().await.unwrap();

        run.await.unwrap().unwrap();
        assert_eq!(seen.recv().await, Some(message));
        assert!(seen.try_recv().is_err());
    }

    #[tokio::test]
    async fn remote_close_is_an_error() {
        let (client_side, server) = MemorySession::pair();
        let client = Client::new(Arc::new(client_side), ClientConfig::default());

        let run = tokio::spawn(client.run());
        greet(&server, 1).await;
        server.close();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Transport(TransportError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_client_times_out() {
        let (client_side, server) = MemorySession::pair();
        let client = Client::new(
            Arc::new(client_side),
            ClientConfig::default().accept_timeout(Duration::from_secs(5)),
        );

        let run = tokio::spawn(client.run());
        greet(&server, 1).await;

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Transport(TransportError::Timeout(_))
        ));
    }
}
