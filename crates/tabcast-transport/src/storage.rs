//! Polling transport over a shared key/value store.
//!
//! Messages are written as JSON envelopes under per-channel keys. Every
//! member polls the store at the `loop` interval, delivers envelopes it has
//! not seen yet and deletes the ones older than `ttl`.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, LazyLock},
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tabcast_core::{ChannelOptions, Listener, Message, Transport, TransportError};
use tokio::{runtime::Handle, task::JoinHandle, time::MissedTickBehavior};
use uuid::Uuid;

use crate::{
    chooser::TransportMethod,
    listeners::ListenerSet,
    protocol::{Envelope, channel_prefix, key_id, now_millis},
};

/// Lower bound for the poll period.
const MIN_POLL: Duration = Duration::from_millis(1);

static GLOBAL: LazyLock<SharedStorage> = LazyLock::new(SharedStorage::default);

/// String key/value store shared by every storage transport using it.
///
/// Cloning yields another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct SharedStorage {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl SharedStorage {
    /// Create a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the process-wide store.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL.clone()
    }

    /// Write a value.
    pub fn set_item(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().insert(key.into(), value.into());
    }

    /// Read a value.
    #[must_use]
    pub fn get_item(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    /// Delete a value, returning it.
    pub fn remove_item(&self, key: &str) -> Option<String> {
        self.entries.write().remove(key)
    }

    /// Every entry whose key starts with `prefix`.
    #[must_use]
    pub fn entries_with_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        self.entries
            .read()
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Every entry stored for `channel`.
    ///
    /// Entries of channels whose name merely starts with `channel:` are
    /// excluded.
    #[must_use]
    pub fn channel_entries(&self, channel: &str) -> Vec<(String, String)> {
        self.entries_with_prefix(&channel_prefix(channel))
            .into_iter()
            .filter(|(key, _)| key_id(channel, key).is_some())
            .collect()
    }

    /// Delete the envelopes of `channel` older than `ttl`.
    ///
    /// Entries that are not valid envelopes are deleted too. Returns the
    /// number of deleted entries.
    pub fn prune_expired(&self, channel: &str, now: u64, ttl: Duration) -> usize {
        let prefix = channel_prefix(channel);
        let mut entries = self.entries.write();
        let mut doomed = Vec::new();
        for (key, raw) in entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
        {
            if key_id(channel, key).is_none() {
                continue;
            }
            match Envelope::from_json(raw) {
                Ok(envelope) if envelope.is_expired(now, ttl) => doomed.push(key.clone()),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(%key, "dropping malformed storage entry: {e}");
                    doomed.push(key.clone());
                }
            }
        }
        for key in &doomed {
            entries.remove(key);
        }
        doomed.len()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[derive(Default)]
struct State {
    name: Option<String>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

/// Transport writing envelopes into a [`SharedStorage`] and polling it.
///
/// Consumes the `loop` (poll period) and `ttl` (entry lifetime) options.
pub struct StorageTransport {
    id: Uuid,
    storage: SharedStorage,
    listeners: Arc<ListenerSet>,
    state: Mutex<State>,
}

impl Default for StorageTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageTransport {
    /// Create a transport over the process-wide store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_storage(SharedStorage::global())
    }

    /// Create a transport over a specific store.
    #[must_use]
    pub fn with_storage(storage: SharedStorage) -> Self {
        Self {
            id: Uuid::new_v4(),
            storage,
            listeners: Arc::new(ListenerSet::new()),
            state: Mutex::new(State::default()),
        }
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        if let Some(task) = state.task.take() {
            task.abort();
        }
        drop(state);
        self.listeners.clear();
    }
}

struct Poller {
    storage: SharedStorage,
    channel: String,
    own_id: Uuid,
    ttl: Duration,
    seen: HashSet<Uuid>,
    listeners: Arc<ListenerSet>,
}

impl Poller {
    fn poll_once(&mut self) {
        let now = now_millis();
        let pruned = self.storage.prune_expired(&self.channel, now, self.ttl);
        if pruned > 0 {
            tracing::trace!(channel = %self.channel, pruned, "expired entries pruned");
        }

        let mut live = HashSet::new();
        for (_, raw) in self.storage.channel_entries(&self.channel) {
            let Ok(envelope) = Envelope::from_json(&raw) else {
                continue;
            };
            if envelope.channel != self.channel || envelope.is_expired(now, self.ttl) {
                continue;
            }
            live.insert(envelope.id);
            if envelope.sender == self.own_id || !self.seen.insert(envelope.id) {
                continue;
            }
            self.listeners.dispatch(&envelope.message);
        }

        self.seen.retain(|id| live.contains(id));
    }

    async fn run(mut self, period: Duration) {
        let mut ticker = tokio::time::interval(period.max(MIN_POLL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.poll_once();
        }
    }
}

impl Transport for StorageTransport {
    fn kind(&self) -> &'static str {
        "storage"
    }

    fn init(&mut self, name: &str, options: &ChannelOptions) -> Result<(), TransportError> {
        let handle = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let state = self.state.get_mut();
        if state.closed {
            return Err(TransportError::Closed);
        }

        // Only messages posted after joining are delivered.
        let seen = self
            .storage
            .channel_entries(name)
            .iter()
            .filter_map(|(key, _)| key_id(name, key))
            .collect();

        let poller = Poller {
            storage: self.storage.clone(),
            channel: name.to_owned(),
            own_id: self.id,
            ttl: options.ttl(),
            seen,
            listeners: Arc::clone(&self.listeners),
        };
        state.task = Some(handle.spawn(poller.run(options.loop_interval())));
        state.name = Some(name.to_owned());
        tracing::debug!(
            channel = %name,
            id = %self.id,
            poll = ?options.loop_interval(),
            "storage transport joined"
        );
        Ok(())
    }

    fn post_message(&self, msg: &Message) -> Result<(), TransportError> {
        let state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let Some(name) = state.name.as_deref() else {
            return Err(TransportError::NotInitialized);
        };

        let envelope = Envelope::new(self.id, name, msg.clone());
        self.storage.set_item(envelope.storage_key(), envelope.to_json()?);
        Ok(())
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

impl Drop for StorageTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Selection entry for [`StorageTransport`] over the process-wide store.
#[derive(Debug, Default, Clone, Copy)]
pub struct StorageMethod;

impl TransportMethod for StorageMethod {
    fn kind(&self) -> &'static str {
        "storage"
    }

    fn can_be_used(&self) -> bool {
        Handle::try_current().is_ok()
    }

    fn create(&self) -> Box<dyn Transport> {
        Box::new(StorageTransport::new())
    }
}
