use skein_transport::TransportError;

use crate::types::ClientId;
use crate::wire::PacketType;

/// Malformed or unreadable message on a single stream.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("stream ended while reading {field}")]
    Truncated { field: &'static str },

    #[error("unknown packet type {0}")]
    UnknownPacket(u8),

    #[error("unexpected {0:?} packet")]
    UnexpectedPacket(PacketType),

    #[error("{field} too large: {size} bytes (max {max})")]
    TooLarge {
        field: &'static str,
        size: u64,
        max: u64,
    },

    #[error("stream i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Protocol-level errors for Skein.
///
/// Wraps transport errors (fatal to a connection) and wire errors
/// (local to one stream on the server, fatal on the client).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("malformed message: {0}")]
    Wire(#[from] WireError),

    #[error("no free client identifiers")]
    RegistryFull,

    #[error("no connected client {0}")]
    UnknownClient(ClientId),
}
