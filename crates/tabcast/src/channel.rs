//! Named channel with a coalescing, throttled flush loop.

use std::{fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tabcast_core::{
    ChannelOptions, FrameCallback, FrameScheduler, Listener, Message, NoopTransport,
    PendingBuffer, Transport, TransportSelector,
};
use tabcast_transport::MethodChooser;

use crate::scheduler::IntervalScheduler;

/// Flush loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No frame is scheduled.
    Idle,
    /// A frame is scheduled and the loop keeps rescheduling until the buffer
    /// is empty.
    Armed,
}

struct FlushState {
    pending: PendingBuffer,
    /// Start of the open flush-wait window, if any.
    window_start: Option<Duration>,
    loop_state: LoopState,
    closed: bool,
}

impl FlushState {
    fn new() -> Self {
        Self {
            pending: PendingBuffer::new(),
            window_start: None,
            loop_state: LoopState::Idle,
            closed: false,
        }
    }
}

struct Shared {
    name: String,
    options: ChannelOptions,
    transport: Box<dyn Transport>,
    scheduler: Arc<dyn FrameScheduler>,
    inert: bool,
    flush: Mutex<FlushState>,
    /// Held while a batch reaches the transport; `close` waits for it.
    delivery: Mutex<()>,
}

impl Shared {
    fn schedule(this: &Arc<Self>) {
        let next = Arc::clone(this);
        let callback: FrameCallback = Box::new(move |now| Self::tick(&next, now));
        this.scheduler.request_frame(callback);
    }

    /// One frame of the flush loop.
    fn tick(this: &Arc<Self>, now: Duration) {
        let batch = {
            let mut state = this.flush.lock();
            if state.closed {
                state.pending.clear();
                state.window_start = None;
                state.loop_state = LoopState::Idle;
                return;
            }

            let start = *state.window_start.get_or_insert(now);
            if now.saturating_sub(start) >= this.options.throttle() {
                state.window_start = None;
                state.pending.drain()
            } else {
                Vec::new()
            }
        };

        if !batch.is_empty() {
            this.deliver(batch);
        }

        let again = {
            let mut state = this.flush.lock();
            if state.closed {
                state.pending.clear();
                state.window_start = None;
            }
            if state.pending.is_empty() {
                state.loop_state = LoopState::Idle;
                false
            } else {
                true
            }
        };

        if again {
            Self::schedule(this);
        }
    }

    fn deliver(&self, batch: Vec<Message>) {
        let _delivering = self.delivery.lock();
        if !self.is_open() {
            tracing::trace!(channel = %self.name, count = batch.len(), "batch dropped, channel closed");
            return;
        }
        tracing::debug!(channel = %self.name, count = batch.len(), "flushing");
        for msg in &batch {
            if let Err(e) = self.transport.post_message(msg) {
                tracing::warn!(
                    channel = %self.name,
                    kind = %msg.kind,
                    transport = self.transport.kind(),
                    "message dropped: {e}"
                );
            }
        }
    }

    /// Whether operations should reach the transport.
    fn is_open(&self) -> bool {
        !self.flush.lock().closed
    }
}

/// Scheduler for channels that never schedule anything.
struct Dormant;

impl FrameScheduler for Dormant {
    fn request_frame(&self, _callback: FrameCallback) {}
}

/// A named message channel.
///
/// Messages are buffered by type (a newer message of a type replaces an
/// unflushed older one) and handed to the transport at most once per
/// `throttle` window. Listener registration and `close` go straight to the
/// transport.
///
/// No operation ever fails: see the crate docs on inert channels.
pub struct Channel {
    shared: Arc<Shared>,
}

impl Channel {
    /// Open a channel with the default transport ranking and a tokio frame
    /// scheduler.
    ///
    /// Outside a tokio runtime the channel is inert.
    #[must_use]
    pub fn new(name: impl Into<String>, options: ChannelOptions) -> Self {
        Self::builder(name).options(options).build()
    }

    /// Start building a channel with explicit collaborators.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ChannelBuilder {
        ChannelBuilder {
            name: name.into(),
            options: ChannelOptions::default(),
            selector: None,
            scheduler: None,
        }
    }

    /// Queue a message for the next flush.
    pub fn post_message(&self, msg: Message) {
        if self.shared.inert {
            return;
        }

        let arm = {
            let mut state = self.shared.flush.lock();
            if state.closed {
                return;
            }
            state.pending.insert(msg);
            if state.loop_state == LoopState::Idle {
                state.loop_state = LoopState::Armed;
                true
            } else {
                false
            }
        };

        if arm {
            tracing::trace!(channel = %self.shared.name, "flush loop armed");
            Shared::schedule(&self.shared);
        }
    }

    /// Set the handler receiving every incoming message.
    pub fn on_message(&self, listener: Listener) {
        if self.shared.is_open() {
            self.shared.transport.on_message(listener);
        }
    }

    /// Register a listener for an event type.
    pub fn add_event_listener(&self, event: &str, listener: Listener) {
        if self.shared.is_open() {
            self.shared.transport.add_event_listener(event, listener);
        }
    }

    /// Remove a listener registered with [`Channel::add_event_listener`].
    pub fn remove_event_listener(&self, event: &str, listener: &Listener) {
        if self.shared.is_open() {
            self.shared.transport.remove_event_listener(event, listener);
        }
    }

    /// Close the channel and its transport.
    ///
    /// Unflushed messages are discarded and every later call is a no-op.
    pub fn close(&self) {
        {
            let mut state = self.shared.flush.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.pending.clear();
        }
        tracing::debug!(channel = %self.shared.name, "channel closed");
        let _delivering = self.shared.delivery.lock();
        self.shared.transport.close();
    }

    /// Channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Effective configuration.
    #[must_use]
    pub fn options(&self) -> &ChannelOptions {
        &self.shared.options
    }

    /// Whether the channel failed to get a transport.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.shared.inert
    }

    /// Whether [`Channel::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.shared.is_open()
    }

    /// Kind of the transport in use (`"noop"` when inert).
    #[must_use]
    pub fn transport_kind(&self) -> &'static str {
        self.shared.transport.kind()
    }

    /// Number of messages waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.flush.lock().pending.len()
    }

    /// Current flush loop state.
    #[must_use]
    pub fn loop_state(&self) -> LoopState {
        self.shared.flush.lock().loop_state
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.shared.name)
            .field("transport", &self.shared.transport.kind())
            .field("inert", &self.shared.inert)
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Channel`].
pub struct ChannelBuilder {
    name: String,
    options: ChannelOptions,
    selector: Option<Box<dyn TransportSelector>>,
    scheduler: Option<Arc<dyn FrameScheduler>>,
}

impl ChannelBuilder {
    /// Set the configuration.
    #[must_use]
    pub fn options(mut self, options: ChannelOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the transport selector (default: [`MethodChooser::default`]).
    #[must_use]
    pub fn selector(mut self, selector: impl TransportSelector + 'static) -> Self {
        self.selector = Some(Box::new(selector));
        self
    }

    /// Set the frame scheduler (default: [`IntervalScheduler`]).
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn FrameScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Resolve the transport and open the channel.
    ///
    /// Never fails; problems produce an inert channel.
    #[must_use]
    pub fn build(self) -> Channel {
        let Self {
            name,
            options,
            selector,
            scheduler,
        } = self;

        if name.is_empty() {
            return inert(name, options, "empty channel name");
        }

        let scheduler = match scheduler {
            Some(scheduler) => scheduler,
            None => match IntervalScheduler::try_new() {
                Some(scheduler) => Arc::new(scheduler),
                None => return inert(name, options, "no tokio runtime for frame scheduling"),
            },
        };

        let selector = selector.unwrap_or_else(|| Box::new(MethodChooser::default()));
        let Some(factory) = selector.select() else {
            return inert(name, options, "no transport available");
        };

        let mut transport = factory();
        if let Err(e) = transport.init(&name, &options) {
            tracing::warn!(channel = %name, transport = transport.kind(), "transport init failed: {e}");
            return inert(name, options, "transport init failed");
        }

        tracing::debug!(channel = %name, transport = transport.kind(), "channel opened");
        Channel {
            shared: Arc::new(Shared {
                name,
                options,
                transport,
                scheduler,
                inert: false,
                flush: Mutex::new(FlushState::new()),
                delivery: Mutex::new(()),
            }),
        }
    }
}

fn inert(name: String, options: ChannelOptions, reason: &'static str) -> Channel {
    tracing::warn!(channel = %name, reason, "channel is inert, messages will not be delivered");
    Channel {
        shared: Arc::new(Shared {
            name,
            options,
            transport: Box::new(NoopTransport),
            scheduler: Arc::new(Dormant),
            inert: true,
            flush: Mutex::new(FlushState::new()),
            delivery: Mutex::new(()),
        }),
    }
}
