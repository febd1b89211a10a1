//! Event router: matches delivered messages to registered handlers.

use crate::types::Message;

/// Handlers registered under this name receive every message.
pub const WILDCARD: &str = "";

type Handler<C> = Box<dyn Fn(&C, &Message) + Send + Sync>;

/// Ordered (event name, handler) registrations.
///
/// `C` is the context handed to every handler; the client passes its
/// [`Requester`](super::Requester).
pub struct EventRouter<C> {
    handlers: Vec<(String, Handler<C>)>,
}

impl<C> EventRouter<C> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register `handler` for `event`. [`WILDCARD`] matches everything.
    pub fn on(
        &mut self,
        event: impl Into<String>,
        handler: impl Fn(&C, &Message) + Send + Sync + 'static,
    ) {
        self.handlers.push((event.into(), Box::new(handler)));
    }

    /// Invoke every matching handler in registration order.
    /// Returns how many ran.
    pub fn route(&self, ctx: &C, message: &Message) -> usize {
        let mut invoked = 0;
        for (event, handler) in &self.handlers {
            if event == WILDCARD || *event == message.event {
                handler(ctx, message);
                invoked += 1;
            }
        }
        invoked
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C> Default for EventRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for EventRouter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|(event, _)| event))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::types::ClientId;

    fn message(event: &str) -> Message {
        Message::new(event, ClientId::new(2), vec![1u8, 2])
    }

    #[test]
    fn wildcard_and_named() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut router = EventRouter::<()>::new();

        let log = seen.clone();
        router.on(WILDCARD, move |_, m| log.lock().unwrap().push(format!("*:{}", m.event)));
        let log = seen.clone();
        router.on("x", move |_, m| log.lock().unwrap().push(format!("x:{}", m.event)));

        assert_eq!(router.route(&(), &message("x")), 2);
        assert_eq!(router.route(&(), &message("y")), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["*:x", "x:x", "*:y"]);
    }

    #[test]
    fn registration_order_is_preserved() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut router = EventRouter::<()>::new();
        for n in 0..3 {
            let log = seen.clone();
            router.on("tick", move |_, _| log.lock().unwrap().push(n));
        }

        assert_eq!(router.route(&(), &message("tick")), 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(router.len(), 3);
    }

    #[test]
    fn no_match_invokes_nothing() {
        let mut router = EventRouter::<()>::new();
        assert!(router.is_empty());
        router.on("a", |_, _| panic!("must not run"));
        assert_eq!(router.route(&(), &message("b")), 0);
    }

    #[test]
    fn handlers_see_context_and_message() {
        let mut router = EventRouter::<u32>::new();
        let seen = Arc::new(Mutex::new(None));
        let log = seen.clone();
        router.on("ping", move |ctx, m| {
            *log.lock().unwrap() = Some((*ctx, m.sender, m.payload.clone()));
        });

        router.route(&7, &message("ping"));
        let (ctx, sender, payload) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(ctx, 7);
        assert_eq!(sender, ClientId::new(2));
        assert_eq!(&payload[..], &[1, 2]);
    }
}
