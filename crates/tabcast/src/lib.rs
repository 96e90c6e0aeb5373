//! Coalescing, throttled message channel over swappable transports.
//!
//! Provides:
//! - `Channel` - named channel buffering messages by type and flushing them
//!   at most once per throttle window
//! - `ChannelBuilder` - explicit transport selector and frame scheduler
//! - Frame schedulers (tokio interval, manual)
//!
//! # Failure model
//!
//! A channel never reports errors to its caller. An empty name, no usable
//! transport, a transport that fails to initialize, or no tokio runtime for
//! the default scheduler all produce an *inert* channel: every operation is
//! a silent no-op. Check [`Channel::is_inert`] or enable `warn` logging for
//! `tabcast` to detect this.

pub mod channel;
pub mod scheduler;

pub use channel::{Channel, ChannelBuilder, LoopState};
pub use scheduler::{IntervalScheduler, ManualScheduler};
pub use tabcast_core::{
    ChannelOptions, FrameCallback, FrameScheduler, Listener, Message, OptionsError, SelectorFn,
    Transport, TransportError, TransportFactory, TransportSelector,
};
pub use tabcast_transport::{MESSAGE_EVENT, MethodChooser, TransportMethod, choose_method};
