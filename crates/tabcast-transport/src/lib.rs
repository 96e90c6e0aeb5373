//! Reference transports and transport selection.
//!
//! Provides:
//! - Wire envelope (JSON)
//! - Listener registry shared by the transports
//! - In-process broadcast transport (feature: native)
//! - Polling shared-storage transport (feature: storage)
//! - `MethodChooser` - capability-ranked transport selection

pub mod chooser;
pub mod listeners;
pub mod protocol;

#[cfg(feature = "native")]
pub mod native;

#[cfg(feature = "storage")]
pub mod storage;

pub use chooser::{MethodChooser, TransportMethod, choose_method};
pub use listeners::{ListenerSet, MESSAGE_EVENT};
pub use protocol::Envelope;

#[cfg(feature = "native")]
pub use native::{NativeMethod, NativeTransport};

#[cfg(feature = "storage")]
pub use storage::{SharedStorage, StorageMethod, StorageTransport};
