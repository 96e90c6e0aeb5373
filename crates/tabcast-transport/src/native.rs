//! In-process broadcast transport.

use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

use futures::StreamExt;
use parking_lot::Mutex;
use tabcast_core::{ChannelOptions, Listener, Message, Transport, TransportError};
use tokio::{runtime::Handle, sync::broadcast, task::JoinHandle};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use uuid::Uuid;

use crate::{chooser::TransportMethod, listeners::ListenerSet, protocol::Envelope};

/// Buffered envelopes per channel before slow members start lagging.
const HUB_CAPACITY: usize = 1024;

struct Group {
    sender: broadcast::Sender<Envelope>,
    members: usize,
}

/// Process-wide map from channel name to its broadcast group.
static HUB: LazyLock<Mutex<HashMap<String, Group>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

fn join(name: &str) -> (broadcast::Sender<Envelope>, broadcast::Receiver<Envelope>) {
    let mut hub = HUB.lock();
    let group = hub.entry(name.to_owned()).or_insert_with(|| Group {
        sender: broadcast::channel(HUB_CAPACITY).0,
        members: 0,
    });
    group.members += 1;
    (group.sender.clone(), group.sender.subscribe())
}

fn leave(name: &str) {
    let mut hub = HUB.lock();
    if let Some(group) = hub.get_mut(name) {
        group.members = group.members.saturating_sub(1);
        if group.members == 0 {
            hub.remove(name);
            tracing::debug!(channel = %name, "native broadcast group released");
        }
    }
}

/// Number of open transports joined to `name` in this process.
#[must_use]
pub fn group_size(name: &str) -> usize {
    HUB.lock().get(name).map_or(0, |g| g.members)
}

#[derive(Default)]
struct State {
    name: Option<String>,
    sender: Option<broadcast::Sender<Envelope>>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

/// Transport relaying messages between channels of the same name in this
/// process, over a tokio broadcast channel.
pub struct NativeTransport {
    id: Uuid,
    listeners: Arc<ListenerSet>,
    state: Mutex<State>,
}

impl Default for NativeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeTransport {
    /// Create an uninitialized transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            listeners: Arc::new(ListenerSet::new()),
            state: Mutex::new(State::default()),
        }
    }

    /// Sender identifier stamped on every posted envelope.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.sender = None;
        if let Some(task) = state.task.take() {
            task.abort();
        }
        if let Some(name) = state.name.as_deref() {
            leave(name);
        }
        drop(state);
        self.listeners.clear();
    }
}

async fn forward(rx: broadcast::Receiver<Envelope>, own_id: Uuid, listeners: Arc<ListenerSet>) {
    let mut stream = BroadcastStream::new(rx);
    while let Some(next) = stream.next().await {
        match next {
            Ok(envelope) if envelope.sender == own_id => {}
            Ok(envelope) => listeners.dispatch(&envelope.message),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "native transport lagged behind, envelopes dropped");
            }
        }
    }
}

impl Transport for NativeTransport {
    fn kind(&self) -> &'static str {
        "native"
    }

    fn init(&mut self, name: &str, _options: &ChannelOptions) -> Result<(), TransportError> {
        let handle = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let state = self.state.get_mut();
        if state.closed {
            return Err(TransportError::Closed);
        }

        let (sender, rx) = join(name);
        let task = handle.spawn(forward(rx, self.id, Arc::clone(&self.listeners)));

        state.name = Some(name.to_owned());
        state.sender = Some(sender);
        state.task = Some(task);
        tracing::debug!(channel = %name, id = %self.id, "native transport joined");
        Ok(())
    }

    fn post_message(&self, msg: &Message) -> Result<(), TransportError> {
        let state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let (Some(name), Some(sender)) = (state.name.as_deref(), state.sender.as_ref()) else {
            return Err(TransportError::NotInitialized);
        };

        sender
            .send(Envelope::new(self.id, name, msg.clone()))
            .map(|_| ())
            .map_err(|e| TransportError::Delivery(e.to_string()))
    }

    fn on_message(&self, listener: Listener) {
        self.listeners.set_on_message(listener);
    }

    fn add_event_listener(&self, event: &str, listener: Listener) {
        self.listeners.add(event, listener);
    }

    fn remove_event_listener(&self, event: &str, listener: &Listener) {
        self.listeners.remove(event, listener);
    }

    fn close(&self) {
        self.shutdown();
    }
}

impl Drop for NativeTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Selection entry for [`NativeTransport`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeMethod;

impl TransportMethod for NativeMethod {
    fn kind(&self) -> &'static str {
        "native"
    }

    fn can_be_used(&self) -> bool {
        Handle::try_current().is_ok()
    }

    fn create(&self) -> Box<dyn Transport> {
        Box::new(NativeTransport::new())
    }
}
