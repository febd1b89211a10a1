use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use skein_transport::{RecvHalf, Session, Stream};
use tokio::io::BufWriter;

use crate::error::ProtocolError;
use crate::types::ClientId;
use crate::wire::{self, Request, WireLimits};

/// Upper bound on the up-front allocation for a GETCLIENTS answer.
const MAX_PREALLOC_IDS: u32 = 1024;

struct Inner {
    session: Arc<dyn Session>,
    id: AtomicU32,
    closed_locally: AtomicBool,
    limits: WireLimits,
}

/// Issues requests to the relay, one fresh stream per request.
///
/// Cheap to clone; clones share the session and the assigned identifier.
#[derive(Clone)]
pub struct Requester {
    inner: Arc<Inner>,
}

impl Requester {
    pub(crate) fn new(session: Arc<dyn Session>, limits: WireLimits) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                id: AtomicU32::new(0),
                closed_locally: AtomicBool::new(false),
                limits,
            }),
        }
    }

    pub(crate) fn session(&self) -> &Arc<dyn Session> {
        &self.inner.session
    }

    pub(crate) fn closed_locally(&self) -> bool {
        self.inner.closed_locally.load(Ordering::Acquire)
    }

    /// Identifier assigned by the server, or [`ClientId::UNASSIGNED`]
    /// before the handshake.
    pub fn id(&self) -> ClientId {
        ClientId::new(self.inner.id.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.session.is_closed()
    }

    /// Close the session. The client loop then exits cleanly.
    pub fn disconnect(&self) {
        self.inner.closed_locally.store(true, Ordering::Release);
        self.inner.session.close();
    }

    /// Send `request` on a fresh stream and hand back its read half.
    async fn request(&self, request: &Request) -> Result<RecvHalf, ProtocolError> {
        let Stream { send, recv } = self.inner.session.open_stream().await?;
        let mut send = BufWriter::new(send);
        request.write_to(&mut send).await?;
        wire::finish(&mut send).await?;
        Ok(recv)
    }

    /// GETID: learn our identifier and remember it.
    pub async fn handshake(&self) -> Result<ClientId, ProtocolError> {
        let mut recv = self.request(&Request::GetId).await?;
        let id = wire::read_u32(&mut recv, "client id").await?;
        self.inner.id.store(id, Ordering::Release);
        Ok(ClientId::new(id))
    }

    /// Relay `payload` under `event` to one client.
    pub async fn send_to(
        &self,
        event: &str,
        target: ClientId,
        payload: impl Into<Bytes>,
    ) -> Result<(), ProtocolError> {
        self.request(&Request::SendTo {
            event: event.to_owned(),
            target,
            payload: payload.into(),
        })
        .await?;
        Ok(())
    }

    /// Relay `payload` under `event` to every connected client, including us.
    pub async fn send_all(
        &self,
        event: &str,
        payload: impl Into<Bytes>,
    ) -> Result<(), ProtocolError> {
        self.request(&Request::SendAll {
            event: event.to_owned(),
            payload: payload.into(),
        })
        .await?;
        Ok(())
    }

    /// Identifiers of every connected client, ascending.
    pub async fn list_clients(&self) -> Result<Vec<ClientId>, ProtocolError> {
        let mut recv = self.request(&Request::GetClients).await?;
        let count = wire::read_u32(&mut recv, "client count").await?;
        let mut ids = Vec::with_capacity(count.min(MAX_PREALLOC_IDS) as usize);
        for _ in 0..count {
            ids.push(ClientId::new(wire::read_u32(&mut recv, "client id").await?));
        }
        Ok(ids)
    }

    pub(crate) fn limits(&self) -> &WireLimits {
        &self.inner.limits
    }
}

impl std::fmt::Debug for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("id", &self.id())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use skein_transport::MemorySession;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::wire::PacketType;

    #[tokio::test]
    async fn handshake_stores_id() {
        let (client, server) = MemorySession::pair();
        let requester = Requester::new(Arc::new(client), WireLimits::default());
        assert_eq!(requester.id(), ClientId::UNASSIGNED);

        let answer = tokio::spawn(async move {
            let mut stream = server.accept_stream().await.unwrap();
            let packet = wire::read_packet(&mut stream.recv).await.unwrap();
            assert_eq!(packet, PacketType::GetId);
            stream.send.write_all(&7u32.to_le_bytes()).await.unwrap();
            stream.send.shutdown().await.unwrap();
            server
        });

        assert_eq!(requester.handshake().await.unwrap(), ClientId::new(7));
        assert_eq!(requester.id(), ClientId::new(7));
        let _server = answer.await.unwrap();
    }

    #[tokio::test]
    async fn send_all_writes_send_all_tag() {
        let (client, server) = MemorySession::pair();
        let requester = Requester::new(Arc::new(client), WireLimits::default());

        requester.send_all("hello", vec![1u8]).await.unwrap();

        let mut stream = server.accept_stream().await.unwrap();
        let request = Request::read_from(&mut stream.recv, &WireLimits::default())
            .await
            .unwrap();
        assert_eq!(
            request,
            Request::SendAll {
                event: "hello".into(),
                payload: Bytes::from_static(&[1]),
            }
        );
    }

    #[tokio::test]
    async fn truncated_client_list_is_an_error() {
        let (client, server) = MemorySession::pair();
        let requester = Requester::new(Arc::new(client), WireLimits::default());

        let answer = tokio::spawn(async move {
            let mut stream = server.accept_stream().await.unwrap();
            let _ = wire::read_packet(&mut stream.recv).await.unwrap();
            // Claims three ids, sends one.
            stream.send.write_all(&3u32.to_le_bytes()).await.unwrap();
            stream.send.write_all(&1u32.to_le_bytes()).await.unwrap();
            stream.send.shutdown().await.unwrap();
            server
        });

        let err = requester.list_clients().await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Wire(crate::error::WireError::Truncated { .. })
        ));
        let _server = answer.await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_closes_session() {
        let (client, _server) = MemorySession::pair();
        let requester = Requester::new(Arc::new(client), WireLimits::default());
        assert!(requester.is_connected());

        requester.clone().disconnect();
        assert!(!requester.is_connected());
        assert!(requester.closed_locally());
        let sent = requester
            .send_to("x", ClientId::new(1), Vec::<u8>::new())
            .await;
        assert!(sent.is_err());
    }
}
