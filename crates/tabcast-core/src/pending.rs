//! Coalescing buffer for unflushed messages.

use std::collections::HashMap;

use crate::Message;

/// Buffer holding at most one message per type.
///
/// A newer message of a type silently supersedes the older unflushed one.
/// Order between types is not preserved.
#[derive(Debug, Default, Clone)]
pub struct PendingBuffer {
    by_kind: HashMap<String, Message>,
}

impl PendingBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message, returning the one it superseded.
    pub fn insert(&mut self, msg: Message) -> Option<Message> {
        let replaced = self.by_kind.insert(msg.kind.clone(), msg);
        if let Some(ref old) = replaced {
            tracing::trace!(kind = %old.kind, "coalesced unflushed message");
        }
        replaced
    }

    /// Take every buffered message, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<Message> {
        self.by_kind.drain().map(|(_, msg)| msg).collect()
    }

    /// Drop every buffered message.
    pub fn clear(&mut self) {
        self.by_kind.clear();
    }

    /// Number of buffered messages (one per type).
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}
