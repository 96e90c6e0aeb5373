//! Listener registry shared by the transports.

use parking_lot::RwLock;
use tabcast_core::{Listener, Message};

/// Event type whose listeners receive every message.
pub const MESSAGE_EVENT: &str = "message";

#[derive(Default)]
struct Inner {
    on_message: Option<Listener>,
    typed: Vec<(String, Listener)>,
}

/// Registered message handlers of one transport instance.
///
/// Holds a single `on_message` handler plus listeners keyed by event type.
/// A listener for [`MESSAGE_EVENT`] sees every message; any other event type
/// only sees messages of that type.
#[derive(Default)]
pub struct ListenerSet {
    inner: RwLock<Inner>,
}

impl ListenerSet {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the `on_message` handler.
    pub fn set_on_message(&self, listener: Listener) {
        self.inner.write().on_message = Some(listener);
    }

    /// Register a listener for an event type.
    pub fn add(&self, event: &str, listener: Listener) {
        self.inner.write().typed.push((event.to_owned(), listener));
    }

    /// Remove a listener by identity. Returns whether one was removed.
    pub fn remove(&self, event: &str, listener: &Listener) -> bool {
        let mut inner = self.inner.write();
        let before = inner.typed.len();
        inner
            .typed
            .retain(|(kind, existing)| !(kind == event && existing.same(listener)));
        inner.typed.len() != before
    }

    /// Drop every handler.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.on_message = None;
        inner.typed.clear();
    }

    /// Number of typed listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().typed.len()
    }

    /// Whether no handler at all is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read();
        inner.on_message.is_none() && inner.typed.is_empty()
    }

    /// Deliver a message to the matching handlers.
    ///
    /// Handlers run outside the lock so they may (un)register listeners.
    pub fn dispatch(&self, msg: &Message) {
        let targets: Vec<Listener> = {
            let inner = self.inner.read();
            inner
                .on_message
                .iter()
                .cloned()
                .chain(
                    inner
                        .typed
                        .iter()
                        .filter(|(kind, _)| kind == MESSAGE_EVENT || *kind == msg.kind)
                        .map(|(_, listener)| listener.clone()),
                )
                .collect()
        };

        for listener in targets {
            listener.call(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    fn recorder() -> (Listener, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = Listener::new(move |msg| sink.lock().push(msg.kind.clone()));
        (listener, seen)
    }

    #[test]
    fn test_typed_listener_filters_by_kind() {
        let set = ListenerSet::new();
        let (only_a, seen_a) = recorder();
        let (all, seen_all) = recorder();
        set.add("a", only_a);
        set.add(MESSAGE_EVENT, all);

        set.dispatch(&Message::new("a"));
        set.dispatch(&Message::new("b"));

        assert_eq!(*seen_a.lock(), ["a"]);
        assert_eq!(*seen_all.lock(), ["a", "b"]);
    }

    #[test]
    fn test_on_message_is_replaced() {
        let set = ListenerSet::new();
        let (first, seen_first) = recorder();
        let (second, seen_second) = recorder();
        set.set_on_message(first);
        set.set_on_message(second);

        set.dispatch(&Message::new("x"));

        assert!(seen_first.lock().is_empty());
        assert_eq!(*seen_second.lock(), ["x"]);
    }

    #[test]
    fn test_remove_by_identity() {
        let set = ListenerSet::new();
        let (listener, seen) = recorder();
        set.add(MESSAGE_EVENT, listener.clone());

        assert!(!set.remove("other", &listener));
        assert!(!set.remove(MESSAGE_EVENT, &Listener::new(|_| {})));
        assert!(set.remove(MESSAGE_EVENT, &listener));
        assert_eq!(set.len(), 0);

        set.dispatch(&Message::new("x"));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_listener_may_unregister_during_dispatch() {
        let set = Arc::new(ListenerSet::new());
        let registry = Arc::clone(&set);
        set.set_on_message(Listener::new(move |_| registry.clear()));

        set.dispatch(&Message::new("x"));
        assert!(set.is_empty());
    }
}
