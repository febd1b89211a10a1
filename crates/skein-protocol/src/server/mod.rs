//! Relay server.
//!
//! Accepts sessions from any [`Listener`], assigns each an identifier and
//! serves its request streams on a dedicated task.
//!
//! ```no_run
//! use skein_protocol::{Server, ServerConfig};
//! use skein_transport::{QuicListener, TransportConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = TransportConfig::new("0.0.0.0:9000".parse()?).password(b"secret");
//! let listener = QuicListener::bind(&transport)?;
//!
//! let server = Server::new(ServerConfig::default())
//!     .on_connect(|id| println!("client {id} connected"))
//!     .on_disconnect(|id| println!("client {id} left"));
//! server.listen(listener).await?;
//! # Ok(())
//! # }
//! ```

mod dispatch;
mod push;
pub mod registry;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use skein_metrics::RelayMetrics;
use skein_transport::Listener;
use tokio_util::sync::CancellationToken;

use crate::error::ProtocolError;
use crate::types::{ClientId, Message};
use crate::wire::WireLimits;
use registry::{Connection, Registry};

// ── Configuration ──────────────────────────────────────────────────────

/// Server tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Idle deadline for each stream-accept wait. `None` waits forever.
    pub accept_timeout: Option<Duration>,
    pub limits: WireLimits,
}

impl ServerConfig {
    pub fn accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = Some(timeout);
        self
    }

    pub fn limits(mut self, limits: WireLimits) -> Self {
        self.limits = limits;
        self
    }
}

// ── Hooks ──────────────────────────────────────────────────────────────

type StartHook = Arc<dyn Fn(SocketAddr) + Send + Sync>;
type ClientHook = Arc<dyn Fn(ClientId) + Send + Sync>;
type MessageHook = Arc<dyn Fn(ClientId, &Message) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct ServerHooks {
    pub(crate) on_start: Option<StartHook>,
    pub(crate) on_connect: Option<ClientHook>,
    pub(crate) on_disconnect: Option<ClientHook>,
    pub(crate) on_message: Option<MessageHook>,
}

// ── Shared state ───────────────────────────────────────────────────────

/// Everything a connection task needs.
pub(crate) struct ServerContext {
    pub(crate) config: ServerConfig,
    pub(crate) registry: Arc<Registry>,
    pub(crate) metrics: Arc<RelayMetrics>,
    pub(crate) hooks: Arc<ServerHooks>,
    pub(crate) shutdown: CancellationToken,
}

impl ServerContext {
    /// First GETID answered on a connection.
    pub(crate) fn connected(&self, id: ClientId) {
        self.metrics.connects.inc();
        tracing::info!("client {id} connected");
        if let Some(hook) = &self.hooks.on_connect {
            hook(id);
        }
    }

    /// Remove `id` and notify. A no-op if someone else removed it first.
    pub(crate) async fn disconnect(&self, id: ClientId) {
        if let Some(conn) = self.registry.remove(id).await {
            self.released(&conn);
        }
    }

    async fn disconnect_all(&self) {
        for conn in self.registry.drain().await {
            self.released(&conn);
        }
    }

    fn released(&self, conn: &Connection) {
        conn.session().close();
        self.metrics.disconnects.inc();
        self.metrics.live_connections.dec();
        tracing::info!("client {} disconnected", conn.id());
        if let Some(hook) = &self.hooks.on_disconnect {
            hook(conn.id());
        }
    }
}

// ── Server ─────────────────────────────────────────────────────────────

/// The relay server. Configure hooks, then call [`Server::listen`].
pub struct Server {
    config: ServerConfig,
    registry: Arc<Registry>,
    metrics: Arc<RelayMetrics>,
    hooks: ServerHooks,
    shutdown: CancellationToken,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Registry::new()),
            metrics: Arc::new(RelayMetrics::new()),
            hooks: ServerHooks::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Called once with the local address when listening begins.
    pub fn on_start(mut self, hook: impl Fn(SocketAddr) + Send + Sync + 'static) -> Self {
        self.hooks.on_start = Some(Arc::new(hook));
        self
    }

    /// Called once per connection after its first GETID is answered.
    pub fn on_connect(mut self, hook: impl Fn(ClientId) + Send + Sync + 'static) -> Self {
        self.hooks.on_connect = Some(Arc::new(hook));
        self
    }

    /// Called once per connection when it leaves the registry.
    pub fn on_disconnect(mut self, hook: impl Fn(ClientId) + Send + Sync + 'static) -> Self {
        self.hooks.on_disconnect = Some(Arc::new(hook));
        self
    }

    /// Called after every successful push, with the recipient's id.
    pub fn on_message(
        mut self,
        hook: impl Fn(ClientId, &Message) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_message = Some(Arc::new(hook));
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Push `message` to client `target` from server code.
    ///
    /// Counted and reported to the on-message hook like a relayed push.
    /// `message.sender` is sent as given; [`ClientId::UNASSIGNED`] marks
    /// the server itself.
    pub async fn send_to(&self, target: ClientId, message: &Message) -> Result<(), ProtocolError> {
        let conn = self
            .registry
            .lookup(target)
            .await
            .ok_or(ProtocolError::UnknownClient(target))?;
        push::deliver(&conn, message, &self.metrics, &self.hooks).await
    }

    /// Push `message` to every live client. Returns how many pushes succeeded.
    pub async fn send_all(&self, message: Message) -> usize {
        let targets = self.registry.connections().await;
        push::fan_out(
            targets,
            Arc::new(message),
            self.metrics.clone(),
            Arc::new(self.hooks.clone()),
        )
        .await
    }

    /// A handle that can stop the server from another task.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Accept sessions until the listener fails or the server is stopped.
    ///
    /// On return every remaining connection has been closed and removed
    /// from the registry. Stopping through a [`ServerHandle`] yields `Ok`.
    pub async fn listen<L: Listener>(&self, mut listener: L) -> Result<(), ProtocolError> {
        let ctx = Arc::new(ServerContext {
            config: self.config.clone(),
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            hooks: Arc::new(self.hooks.clone()),
            shutdown: self.shutdown.clone(),
        });

        let addr = listener.local_addr()?;
        tracing::info!("relay listening on {addr}");
        if let Some(hook) = &ctx.hooks.on_start {
            hook(addr);
        }

        let result = loop {
            let session = tokio::select! {
                _ = ctx.shutdown.cancelled() => break Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok(session) => session,
                    Err(e) => break Err(ProtocolError::from(e)),
                },
            };
            ctx.metrics.sessions_accepted.inc();

            let Some(conn) = ctx.registry.allocate_and_insert(session.clone()).await else {
                tracing::warn!("rejecting session: {}", ProtocolError::RegistryFull);
                session.close();
                continue;
            };
            ctx.metrics.live_connections.inc();
            tracing::debug!("session accepted as client {}", conn.id());

            tokio::spawn(dispatch::serve_connection(conn, ctx.clone()));
        };

        if let Err(e) = &result {
            tracing::warn!("relay stopped accepting: {e}");
        }
        ctx.shutdown.cancel();
        ctx.disconnect_all().await;
        tracing::info!("relay on {addr} shut down");
        result
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("stopped", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Stops a running [`Server`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: CancellationToken,
}

impl ServerHandle {
    /// End the listen loop and every connection loop.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = ServerConfig::default()
            .accept_timeout(Duration::from_secs(3))
            .limits(WireLimits {
                max_event_name: 8,
                max_payload: 16,
            });
        assert_eq!(config.accept_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.limits.max_payload, 16);
    }

    #[test]
    fn default_config_waits_forever() {
        let config = ServerConfig::default();
        assert!(config.accept_timeout.is_none());
        assert_eq!(config.limits, WireLimits::default());
    }

    #[test]
    fn handle_stops() {
        let server = Server::new(ServerConfig::default());
        let handle = server.handle();
        assert!(!handle.is_stopped());
        handle.stop();
        assert!(server.handle().is_stopped());
    }
}
