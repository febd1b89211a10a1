//! Client registry: live connections keyed by identifier.
//!
//! Identifiers come from a free set of released ids below a high-water
//! mark; when the top id is released the mark compacts downward, so the
//! allocator always hands out the smallest positive id not in use.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use skein_transport::{Session, Stream};
use tokio::io::BufWriter;
use tokio::sync::Mutex;

use crate::error::ProtocolError;
use crate::types::{ClientId, Message};
use crate::wire;

/// One live connection as seen by the server.
pub struct Connection {
    id: ClientId,
    session: Arc<dyn Session>,
    greeted: AtomicBool,
}

impl Connection {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    /// Open a fresh stream to this client and write one MESSAGE to it.
    ///
    /// Nothing is counted or reported to the server hooks; use
    /// [`Server::send_to`](super::Server::send_to) for that.
    pub async fn send(&self, message: &Message) -> Result<(), ProtocolError> {
        let Stream { send, .. } = self.session.open_stream().await?;
        let mut send = BufWriter::new(send);
        message.write_to(&mut send).await?;
        wire::finish(&mut send).await?;
        Ok(())
    }

    /// Record that a GETID was answered. Returns `true` only the first time.
    pub fn mark_greeted(&self) -> bool {
        !self.greeted.swap(true, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.session.is_closed())
            .finish()
    }
}

#[derive(Default)]
struct Inner {
    live: BTreeMap<ClientId, Arc<Connection>>,
    /// Released ids strictly below `next`.
    free: BTreeSet<u32>,
    /// Every id `>= next` is unused.
    next: u32,
}

impl Inner {
    fn allocate(&mut self) -> Option<ClientId> {
        if let Some(raw) = self.free.pop_first() {
            return Some(ClientId::new(raw));
        }
        let raw = self.next.max(1);
        self.next = raw.checked_add(1)?;
        Some(ClientId::new(raw))
    }

    fn release(&mut self, id: ClientId) {
        let raw = id.get();
        if raw + 1 == self.next {
            self.next = raw;
            // Pull the mark down past any released ids now on top.
            while self.next > 1 && self.free.remove(&(self.next - 1)) {
                self.next -= 1;
            }
        } else {
            self.free.insert(raw);
        }
    }
}

/// Set of live connections shared by every connection task.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the smallest free identifier and insert a connection for
    /// `session` under one lock acquisition.
    ///
    /// Returns `None` once every `u32` identifier is taken.
    pub async fn allocate_and_insert(&self, session: Arc<dyn Session>) -> Option<Arc<Connection>> {
        let mut inner = self.inner.lock().await;
        let id = inner.allocate()?;
        let conn = Arc::new(Connection {
            id,
            session,
            greeted: AtomicBool::new(false),
        });
        inner.live.insert(id, conn.clone());
        Some(conn)
    }

    /// Remove `id` if present. The caller that receives `Some` owns the
    /// disconnect notification for that connection.
    pub async fn remove(&self, id: ClientId) -> Option<Arc<Connection>> {
        let mut inner = self.inner.lock().await;
        let conn = inner.live.remove(&id)?;
        inner.release(id);
        Some(conn)
    }

    pub async fn lookup(&self, id: ClientId) -> Option<Arc<Connection>> {
        self.inner.lock().await.live.get(&id).cloned()
    }

    /// Live identifiers, ascending.
    pub async fn snapshot(&self) -> Vec<ClientId> {
        self.inner.lock().await.live.keys().copied().collect()
    }

    pub async fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner.lock().await.live.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.live.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.live.is_empty()
    }

    /// Remove every connection and reset allocation.
    pub async fn drain(&self) -> Vec<Arc<Connection>> {
        let mut inner = self.inner.lock().await;
        let live = std::mem::take(&mut inner.live);
        inner.free.clear();
        inner.next = 0;
        live.into_values().collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_transport::MemorySession;

    fn session() -> Arc<dyn Session> {
        let (local, _remote) = MemorySession::pair();
        Arc::new(local)
    }

    fn ids(raw: &[u32]) -> Vec<ClientId> {
        raw.iter().copied().map(ClientId::new).collect()
    }

    #[tokio::test]
    async fn ids_start_at_one_and_ascend() {
        let reg = Registry::new();
        for expected in 1..=3 {
            let conn = reg.allocate_and_insert(session()).await.unwrap();
            assert_eq!(conn.id().get(), expected);
        }
        assert_eq!(reg.snapshot().await, ids(&[1, 2, 3]));
        assert_eq!(reg.len().await, 3);
    }

    #[tokio::test]
    async fn released_id_is_reused_first() {
        let reg = Registry::new();
        for _ in 0..4 {
            reg.allocate_and_insert(session()).await.unwrap();
        }
        assert!(reg.remove(ClientId::new(2)).await.is_some());
        assert_eq!(reg.snapshot().await, ids(&[1, 3, 4]));

        let conn = reg.allocate_and_insert(session()).await.unwrap();
        assert_eq!(conn.id().get(), 2);
        let conn = reg.allocate_and_insert(session()).await.unwrap();
        assert_eq!(conn.id().get(), 5);
    }

    #[tokio::test]
    async fn high_water_mark_compacts() {
        let reg = Registry::new();
        for _ in 0..4 {
            reg.allocate_and_insert(session()).await.unwrap();
        }
        reg.remove(ClientId::new(3)).await;
        reg.remove(ClientId::new(4)).await;

        {
            let inner = reg.inner.lock().await;
            assert_eq!(inner.next, 3);
            assert!(inner.free.is_empty());
        }

        let conn = reg.allocate_and_insert(session()).await.unwrap();
        assert_eq!(conn.id().get(), 3);
    }

    #[tokio::test]
    async fn removing_everything_restarts_at_one() {
        let reg = Registry::new();
        for _ in 0..3 {
            reg.allocate_and_insert(session()).await.unwrap();
        }
        reg.remove(ClientId::new(1)).await;
        reg.remove(ClientId::new(3)).await;
        reg.remove(ClientId::new(2)).await;
        assert!(reg.is_empty().await);

        let conn = reg.allocate_and_insert(session()).await.unwrap();
        assert_eq!(conn.id().get(), 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let reg = Registry::new();
        reg.allocate_and_insert(session()).await.unwrap();
        assert!(reg.remove(ClientId::new(1)).await.is_some());
        assert!(reg.remove(ClientId::new(1)).await.is_none());
        assert!(reg.remove(ClientId::new(42)).await.is_none());

        let conn = reg.allocate_and_insert(session()).await.unwrap();
        assert_eq!(conn.id().get(), 1);
    }

    #[tokio::test]
    async fn lookup_and_drain() {
        let reg = Registry::new();
        reg.allocate_and_insert(session()).await.unwrap();
        reg.allocate_and_insert(session()).await.unwrap();

        assert_eq!(
            reg.lookup(ClientId::new(2)).await.map(|c| c.id()),
            Some(ClientId::new(2))
        );
        assert!(reg.lookup(ClientId::new(3)).await.is_none());

        let drained = reg.drain().await;
        assert_eq!(drained.len(), 2);
        assert!(reg.is_empty().await);
        assert_eq!(reg.allocate_and_insert(session()).await.unwrap().id().get(), 1);
    }

    #[test]
    fn greeting_is_recorded_once() {
        let conn = Connection {
            id: ClientId::new(1),
            session: session(),
            greeted: AtomicBool::new(false),
        };
        assert!(conn.mark_greeted());
        assert!(!conn.mark_greeted());
    }

    #[test]
    fn exhausted_id_space_returns_none() {
        let mut inner = Inner {
            next: u32::MAX,
            ..Default::default()
        };
        assert!(inner.allocate().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocation_yields_distinct_ids() {
        let reg = Arc::new(Registry::new());
        let mut tasks = Vec::new();
        for _ in 0..64 {
            let reg = reg.clone();
            tasks.push(tokio::spawn(async move {
                reg.allocate_and_insert(session()).await.unwrap().id()
            }));
        }

        let mut seen = BTreeSet::new();
        for task in tasks {
            let id = task.await.unwrap();
            assert!(id.is_assigned());
            assert!(seen.insert(id), "duplicate id {id}");
        }
        assert_eq!(seen.len(), 64);
        assert_eq!(reg.snapshot().await, seen.into_iter().collect::<Vec<_>>());
    }
}
