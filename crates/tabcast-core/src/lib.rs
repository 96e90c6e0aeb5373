//! Core abstractions for coalescing cross-context message channels.
//!
//! This crate provides the fundamental building blocks:
//! - `Message` - Typed message with an opaque JSON payload
//! - `ChannelOptions` - Channel configuration with defaults and passthrough keys
//! - `PendingBuffer` - Coalescing buffer keyed by message type
//! - Transport, selector and frame scheduler traits

pub mod message;
pub mod options;
pub mod pending;
pub mod traits;

pub use message::Message;
pub use options::{ChannelOptions, OptionsError};
pub use pending::PendingBuffer;
pub use traits::{
    FrameCallback, FrameScheduler, Listener, NoopTransport, SelectorFn, Transport, TransportError,
    TransportFactory, TransportSelector,
};
