use std::fmt;

use bytes::Bytes;

/// Identifier the server assigns to a connected party.
///
/// Unique among live connections of one server. `0` is reserved: it means
/// "not assigned yet" on a client and "unknown sender" on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u32);

impl ClientId {
    pub const UNASSIGNED: ClientId = ClientId(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ClientId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<ClientId> for u32 {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

/// A relayed message as delivered to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Event name handlers are matched against.
    pub event: String,
    pub sender: ClientId,
    pub payload: Bytes,
}

impl Message {
    pub fn new(event: impl Into<String>, sender: ClientId, payload: impl Into<Bytes>) -> Self {
        Self {
            event: event.into(),
            sender,
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unassigned_is_zero() {
        assert_eq!(ClientId::UNASSIGNED.get(), 0);
        assert!(!ClientId::UNASSIGNED.is_assigned());
        assert!(ClientId::new(1).is_assigned());
        assert_eq!(ClientId::default(), ClientId::UNASSIGNED);
    }

    #[test]
    fn ids_order_numerically() {
        let mut ids = vec![ClientId::new(3), ClientId::new(1), ClientId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![ClientId::new(1), ClientId::new(2), ClientId::new(3)]);
    }
}
