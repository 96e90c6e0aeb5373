//! Core traits for transports, transport selection and frame scheduling.

use std::{fmt, sync::Arc, time::Duration};

use thiserror::Error;

use crate::{ChannelOptions, Message};

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport not initialized")]
    NotInitialized,
    #[error("Transport closed")]
    Closed,
    #[error("No async runtime available")]
    NoRuntime,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Message callback registered on a transport.
///
/// Listeners are compared by identity, so keep a clone of the value passed to
/// `add_event_listener` to remove it later.
#[derive(Clone)]
pub struct Listener(Arc<dyn Fn(&Message) + Send + Sync>);

impl Listener {
    /// Wrap a callback.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the callback.
    pub fn call(&self, msg: &Message) {
        (self.0)(msg);
    }

    /// Whether both handles point to the same callback.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Trait for cross-context delivery backends.
///
/// A transport is created by a [`TransportFactory`], initialized once and then
/// shared behind `&self`; implementations use interior mutability.
pub trait Transport: Send + Sync {
    /// Short identifier of the backend, for diagnostics.
    fn kind(&self) -> &'static str;

    /// Join the broadcast group `name`.
    ///
    /// # Errors
    /// Returns error if the backend cannot be used in this environment.
    fn init(&mut self, name: &str, options: &ChannelOptions) -> Result<(), TransportError>;

    /// Deliver a message to the other members of the group.
    ///
    /// # Errors
    /// Returns error if the transport is not initialized, closed, or the
    /// backend rejected the message.
    fn post_message(&self, msg: &Message) -> Result<(), TransportError>;

    /// Set the handler receiving every incoming message.
    fn on_message(&self, listener: Listener);

    /// Register a listener for an event type.
    fn add_event_listener(&self, event: &str, listener: Listener);

    /// Remove a previously registered listener.
    fn remove_event_listener(&self, event: &str, listener: &Listener);

    /// Leave the group and release resources.
    fn close(&self);
}

/// Deferred constructor for a transport.
pub type TransportFactory = Box<dyn FnOnce() -> Box<dyn Transport> + Send>;

/// Picks the most capable transport available.
pub trait TransportSelector: Send + Sync {
    /// Return a factory for the best transport, or `None` if none qualifies.
    fn select(&self) -> Option<TransportFactory>;
}

/// Selector backed by a closure.
pub struct SelectorFn<F>(pub F);

impl<F> TransportSelector for SelectorFn<F>
where
    F: Fn() -> Option<TransportFactory> + Send + Sync,
{
    fn select(&self) -> Option<TransportFactory> {
        (self.0)()
    }
}

/// Callback invoked once at the next frame with the frame timestamp.
pub type FrameCallback = Box<dyn FnOnce(Duration) + Send>;

/// Per-frame scheduling service.
///
/// Timestamps are monotonic and measured from the scheduler's own origin.
/// Callbacks run in request order; a callback requested while a frame is
/// running runs on a later frame.
pub trait FrameScheduler: Send + Sync {
    /// Run `callback` at the next frame.
    fn request_frame(&self, callback: FrameCallback);
}

/// Transport that accepts everything and delivers nothing.
///
/// Stands in for a missing transport so callers never branch on liveness.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransport;

impl Transport for NoopTransport {
    fn kind(&self) -> &'static str {
        "noop"
    }

    fn init(&mut self, _name: &str, _options: &ChannelOptions) -> Result<(), TransportError> {
        Ok(())
    }

    fn post_message(&self, _msg: &Message) -> Result<(), TransportError> {
        Ok(())
    }

    fn on_message(&self, _listener: Listener) {}

    fn add_event_listener(&self, _event: &str, _listener: Listener) {}

    fn remove_event_listener(&self, _event: &str, _listener: &Listener) {}

    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_listener_identity() {
        let a = Listener::new(|_| {});
        let b = Listener::new(|_| {});
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
    }

    #[test]
    fn test_listener_call() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let listener = Listener::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        listener.call(&Message::new("a"));
        listener.clone().call(&Message::new("b"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_selector_fn() {
        let none = SelectorFn(|| -> Option<TransportFactory> { None });
        assert!(none.select().is_none());

        let some = SelectorFn(|| {
            Some(Box::new(|| Box::new(NoopTransport) as Box<dyn Transport>) as TransportFactory)
        });
        let transport = some.select().map(|factory| factory()).unwrap();
        assert_eq!(transport.kind(), "noop");
    }

    #[test]
    fn test_noop_transport_accepts_everything() {
        let mut transport = NoopTransport;
        transport.init("name", &ChannelOptions::default()).unwrap();
        transport.post_message(&Message::new("a")).unwrap();
        let listener = Listener::new(|_| {});
        transport.on_message(listener.clone());
        transport.add_event_listener("message", listener.clone());
        transport.remove_event_listener("message", &listener);
        transport.close();
    }
}
