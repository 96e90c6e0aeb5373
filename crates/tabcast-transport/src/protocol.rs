//! Wire envelope shared by the transports.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tabcast_core::Message;
use uuid::Uuid;

/// Prefix of every storage key written by a transport.
pub const KEY_PREFIX: &str = "tabcast:";

/// Transport-level wrapper around a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique envelope identifier.
    pub id: Uuid,
    /// Identifier of the transport instance that posted it.
    pub sender: Uuid,
    /// Channel name.
    pub channel: String,
    /// Post time (Unix epoch milliseconds).
    pub time: u64,
    /// The message itself.
    pub message: Message,
}

impl Envelope {
    /// Wrap a message posted now.
    #[must_use]
    pub fn new(sender: Uuid, channel: impl Into<String>, message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            channel: channel.into(),
            time: now_millis(),
            message,
        }
    }

    /// Key under which the envelope is stored.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}{}", channel_prefix(&self.channel), self.id)
    }

    /// Whether the envelope is older than `ttl` at `now` (epoch millis).
    #[must_use]
    pub fn is_expired(&self, now: u64, ttl: Duration) -> bool {
        let ttl = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        now.saturating_sub(self.time) > ttl
    }

    /// Encode as JSON.
    ///
    /// # Errors
    /// Returns error if the payload cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from JSON.
    ///
    /// # Errors
    /// Returns error if `s` is not a valid envelope.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Storage key prefix for every envelope of a channel.
#[must_use]
pub fn channel_prefix(channel: &str) -> String {
    format!("{KEY_PREFIX}{channel}:")
}

/// Envelope id encoded in `key`, if the key belongs to `channel`.
///
/// Names may contain `:`, so a key of channel `a:b` also starts with the
/// prefix of channel `a`. Ids never contain `:`, which keeps the split
/// unambiguous.
#[must_use]
pub fn key_id(channel: &str, key: &str) -> Option<Uuid> {
    key.strip_prefix(&channel_prefix(channel))
        .filter(|rest| !rest.contains(':'))
        .and_then(|rest| Uuid::parse_str(rest).ok())
}

/// Current wall-clock time in Unix epoch milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
