//! Messages carried by a channel.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key that carries the message type on the wire.
pub const TYPE_KEY: &str = "type";

/// Application-defined message.
///
/// Only `kind` is meaningful to the channel: it is the coalescing key.
/// Everything else is opaque payload, flattened next to `type` when
/// serialized, so `{"type":"cursor","x":1}` round-trips as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message type, used as the coalescing key.
    #[serde(rename = "type")]
    pub kind: String,

    /// Remaining fields of the message.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Message {
    /// Create a message with an empty payload.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Create a message with a payload.
    #[must_use]
    pub fn with_payload(kind: impl Into<String>, payload: Map<String, Value>) -> Self {
        let mut msg = Self::new(kind);
        for (key, value) in payload {
            msg.set(key, value);
        }
        msg
    }

    /// Builder-style variant of [`Message::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value.into());
        self
    }

    /// Get a payload value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Set a payload value, returning the previous one.
    ///
    /// The `type` key is reserved for [`Message::kind`] and is ignored here.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        if key == TYPE_KEY {
            return None;
        }
        self.payload.insert(key, value)
    }
}
