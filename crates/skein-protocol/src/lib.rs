//! Skein relay protocol.
//!
//! A small pub/sub relay on top of any `skein-transport` session: clients
//! get an identifier from the server, then send named events to one
//! client or to everyone, and receive whatever others relay to them.
//!
//! Each request or delivery travels on its own stream: one tag byte, a
//! tag-specific body, then the opener closes its side. See [`wire`] for
//! the exact layout.

pub mod client;
pub mod error;
pub mod server;
pub mod types;
pub mod wire;

use std::time::Duration;

use skein_transport::{Session, Stream, TransportError};

pub use client::{Client, ClientConfig, EventRouter, Requester, WILDCARD};
pub use error::{ProtocolError, WireError};
pub use server::registry::{Connection, Registry};
pub use server::{Server, ServerConfig, ServerHandle};
pub use types::{ClientId, Message};
pub use wire::{PacketType, Request, WireLimits};

/// Wait for the peer's next stream, giving up after `timeout` if set.
pub(crate) async fn accept_next(
    session: &dyn Session,
    timeout: Option<Duration>,
) -> Result<Stream, TransportError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, session.accept_stream())
            .await
            .map_err(|_| TransportError::Timeout(limit))?,
        None => session.accept_stream().await,
    }
}
