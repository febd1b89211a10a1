//! Wire codec.
//!
//! Every stream carries one message: a one-byte packet tag followed by a
//! tag-specific body. All integers are little-endian. There is no outer
//! length prefix; the stream boundary frames the message.
//!
//! ```text
//! GETID       C→S  tag                          S→C  id:u32
//! SENDTO      C→S  tag name target:u32 payload
//! SENDALL     C→S  tag name payload
//! MESSAGE     S→C  tag name sender:u32 payload
//! GETCLIENTS  C→S  tag                          S→C  count:u32 id:u32*count
//!
//! name    = len:u32 bytes
//! payload = len:u64 bytes
//! ```
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::WireError;
use crate::types::{ClientId, Message};

/// Packet tags. New behavior gets a new tag; existing bodies never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Handshake: the server answers with the caller's identifier.
    GetId = 0,
    /// Relay a message to one client.
    SendTo = 1,
    /// Relay a message to every connected client.
    SendAll = 2,
    /// Server → client delivery of a relayed message.
    Message = 3,
    /// List connected client identifiers.
    GetClients = 4,
}

impl TryFrom<u8> for PacketType {
    type Error = WireError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(PacketType::GetId),
            1 => Ok(PacketType::SendTo),
            2 => Ok(PacketType::SendAll),
            3 => Ok(PacketType::Message),
            4 => Ok(PacketType::GetClients),
            other => Err(WireError::UnknownPacket(other)),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(packet: PacketType) -> Self {
        packet as u8
    }
}

/// Upper bounds on declared field lengths, checked before allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireLimits {
    pub max_event_name: usize,
    pub max_payload: usize,
}

impl Default for WireLimits {
    fn default() -> Self {
        Self {
            max_event_name: 64 * 1024,
            max_payload: 16 * 1024 * 1024,
        }
    }
}

// ── Primitives ─────────────────────────────────────────────────────────

async fn read_field<R>(r: &mut R, buf: &mut [u8], field: &'static str) -> Result<(), WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match r.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(WireError::Truncated { field })
        }
        Err(e) => Err(WireError::Io(e)),
    }
}

pub async fn read_packet<R>(r: &mut R) -> Result<PacketType, WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut tag = [0u8; 1];
    read_field(r, &mut tag, "packet type").await?;
    PacketType::try_from(tag[0])
}

pub async fn write_packet<W>(w: &mut W, packet: PacketType) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    w.write_all(&[packet.into()]).await?;
    Ok(())
}

pub async fn read_u32<R>(r: &mut R, field: &'static str) -> Result<u32, WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; 4];
    read_field(r, &mut buf, field).await?;
    Ok(u32::from_le_bytes(buf))
}

pub async fn write_u32<W>(w: &mut W, value: u32) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    w.write_all(&value.to_le_bytes()).await?;
    Ok(())
}

/// Read a length-prefixed event name.
///
/// Invalid UTF-8 is not an error; offending bytes decode to U+FFFD.
pub async fn read_event_name<R>(r: &mut R, limits: &WireLimits) -> Result<String, WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = read_u32(r, "event name length").await? as usize;
    if len > limits.max_event_name {
        return Err(WireError::TooLarge {
            field: "event name",
            size: len as u64,
            max: limits.max_event_name as u64,
        });
    }

    let mut buf = vec![0u8; len];
    read_field(r, &mut buf, "event name").await?;
    Ok(match String::from_utf8(buf) {
        Ok(name) => name,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

pub async fn write_event_name<W>(w: &mut W, name: &str) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let len = u32::try_from(name.len()).map_err(|_| WireError::TooLarge {
        field: "event name",
        size: name.len() as u64,
        max: u32::MAX as u64,
    })?;
    write_u32(w, len).await?;
    w.write_all(name.as_bytes()).await?;
    Ok(())
}

/// Read a length-prefixed payload. Zero length is valid.
pub async fn read_payload<R>(r: &mut R, limits: &WireLimits) -> Result<Bytes, WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len = [0u8; 8];
    read_field(r, &mut len, "payload length").await?;
    let len = u64::from_le_bytes(len);
    if len > limits.max_payload as u64 {
        return Err(WireError::TooLarge {
            field: "payload",
            size: len,
            max: limits.max_payload as u64,
        });
    }

    let mut buf = vec![0u8; len as usize];
    read_field(r, &mut buf, "payload").await?;
    Ok(Bytes::from(buf))
}

pub async fn write_payload<W>(w: &mut W, payload: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    w.write_all(&(payload.len() as u64).to_le_bytes()).await?;
    w.write_all(payload).await?;
    Ok(())
}

/// Flush and close our side of the stream.
pub async fn finish<W>(w: &mut W) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    w.shutdown().await?;
    Ok(())
}

// ── Composite messages ─────────────────────────────────────────────────

/// A client → server request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GetId,
    SendTo {
        event: String,
        target: ClientId,
        payload: Bytes,
    },
    SendAll {
        event: String,
        payload: Bytes,
    },
    GetClients,
}

impl Request {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Request::GetId => PacketType::GetId,
            Request::SendTo { .. } => PacketType::SendTo,
            Request::SendAll { .. } => PacketType::SendAll,
            Request::GetClients => PacketType::GetClients,
        }
    }

    /// Decode the body that follows an already-read `packet` tag.
    pub async fn read_body<R>(
        packet: PacketType,
        r: &mut R,
        limits: &WireLimits,
    ) -> Result<Self, WireError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        match packet {
            PacketType::GetId => Ok(Request::GetId),
            PacketType::SendTo => {
                let event = read_event_name(r, limits).await?;
                let target = ClientId::new(read_u32(r, "target id").await?);
                let payload = read_payload(r, limits).await?;
                Ok(Request::SendTo {
                    event,
                    target,
                    payload,
                })
            }
            PacketType::SendAll => {
                let event = read_event_name(r, limits).await?;
                let payload = read_payload(r, limits).await?;
                Ok(Request::SendAll { event, payload })
            }
            PacketType::GetClients => Ok(Request::GetClients),
            PacketType::Message => Err(WireError::UnexpectedPacket(packet)),
        }
    }

    /// Read tag and body.
    pub async fn read_from<R>(r: &mut R, limits: &WireLimits) -> Result<Self, WireError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let packet = read_packet(r).await?;
        Self::read_body(packet, r, limits).await
    }

    /// Write tag and body.
    pub async fn write_to<W>(&self, w: &mut W) -> Result<(), WireError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        write_packet(w, self.packet_type()).await?;
        match self {
            Request::GetId | Request::GetClients => {}
            Request::SendTo {
                event,
                target,
                payload,
            } => {
                write_event_name(w, event).await?;
                write_u32(w, target.get()).await?;
                write_payload(w, payload).await?;
            }
            Request::SendAll { event, payload } => {
                write_event_name(w, event).await?;
                write_payload(w, payload).await?;
            }
        }
        Ok(())
    }
}

impl Message {
    /// Decode the body that follows a MESSAGE tag.
    pub async fn read_body<R>(r: &mut R, limits: &WireLimits) -> Result<Self, WireError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let event = read_event_name(r, limits).await?;
        let sender = ClientId::new(read_u32(r, "sender id").await?);
        let payload = read_payload(r, limits).await?;
        Ok(Message {
            event,
            sender,
            payload,
        })
    }

    /// Write the MESSAGE tag and body.
    pub async fn write_to<W>(&self, w: &mut W) -> Result<(), WireError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        write_packet(w, PacketType::Message).await?;
        write_event_name(w, &self.event).await?;
        write_u32(w, self.sender.get()).await?;
        write_payload(w, &self.payload).await?;
        Ok(())
    }
}
