//! Channel configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Default message time-to-live (30 seconds).
pub const DEFAULT_TTL_MS: u64 = 30_000;

/// Default polling interval for transports that must poll.
pub const DEFAULT_LOOP_MS: u64 = 150;

/// Default minimum spacing between flush dispatches.
pub const DEFAULT_THROTTLE_MS: u64 = 200;

/// Options error.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("Options must be a JSON object")]
    NotAnObject,
    #[error("Invalid options: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Resolved channel configuration.
///
/// All durations are expressed in milliseconds on the wire. Keys other than
/// `ttl`, `loop` and `throttle` are kept verbatim in [`ChannelOptions::extra`]
/// so transports can read their own settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PartialOptions")]
pub struct ChannelOptions {
    ttl: u64,
    #[serde(rename = "loop")]
    loop_interval: u64,
    throttle: u64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Options as supplied by the caller; absent or `null` keys get defaults.
#[derive(Debug, Default, Deserialize)]
struct PartialOptions {
    ttl: Option<u64>,
    #[serde(rename = "loop")]
    loop_interval: Option<u64>,
    throttle: Option<u64>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<PartialOptions> for ChannelOptions {
    fn from(partial: PartialOptions) -> Self {
        Self {
            ttl: partial.ttl.unwrap_or(DEFAULT_TTL_MS),
            loop_interval: partial.loop_interval.unwrap_or(DEFAULT_LOOP_MS),
            throttle: partial.throttle.unwrap_or(DEFAULT_THROTTLE_MS),
            extra: partial.extra,
        }
    }
}

impl Default for ChannelOptions {
    fn default() -> Self {
        PartialOptions::default().into()
    }
}

impl ChannelOptions {
    /// Merge a partial JSON object over the defaults.
    ///
    /// # Errors
    /// Returns error if `value` is not an object or a recognized key has the
    /// wrong type.
    pub fn from_value(value: Value) -> Result<Self, OptionsError> {
        if !value.is_object() {
            return Err(OptionsError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Parse options from a JSON string.
    ///
    /// # Errors
    /// Returns error if the string is not a JSON object of valid options.
    pub fn from_json_str(s: &str) -> Result<Self, OptionsError> {
        Self::from_value(serde_json::from_str(s)?)
    }

    /// Set the message time-to-live.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = millis(ttl);
        self
    }

    /// Set the polling interval.
    #[must_use]
    pub fn with_loop_interval(mut self, interval: Duration) -> Self {
        self.loop_interval = millis(interval);
        self
    }

    /// Set the flush throttle.
    #[must_use]
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = millis(throttle);
        self
    }

    /// Add a passthrough key.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Message time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl)
    }

    /// Polling interval for transports that must poll.
    #[must_use]
    pub const fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_interval)
    }

    /// Minimum spacing between flush dispatches.
    #[must_use]
    pub const fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle)
    }

    /// Get a passthrough value by key.
    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_empty_object_gets_defaults() {
        let opts = assert_ok!(ChannelOptions::from_value(json!({})));
        assert_eq!(opts.ttl(), Duration::from_millis(30_000));
        assert_eq!(opts.loop_interval(), Duration::from_millis(150));
        assert_eq!(opts.throttle(), Duration::from_millis(200));
        assert_eq!(opts, ChannelOptions::default());
    }

    #[test]
    fn test_supplied_values_win() {
        let opts = assert_ok!(ChannelOptions::from_value(json!({"throttle": 50})));
        assert_eq!(opts.ttl(), Duration::from_millis(30_000));
        assert_eq!(opts.loop_interval(), Duration::from_millis(150));
        assert_eq!(opts.throttle(), Duration::from_millis(50));
    }

    #[test]
    fn test_null_means_default() {
        let opts = assert_ok!(ChannelOptions::from_json_str(r#"{"ttl": null, "loop": 10}"#));
        assert_eq!(opts.ttl(), Duration::from_millis(DEFAULT_TTL_MS));
        assert_eq!(opts.loop_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let opts = assert_ok!(ChannelOptions::from_value(
            json!({"webWorkerSupport": false, "prefix": "app"})
        ));
        assert_eq!(opts.extra("prefix"), Some(&json!("app")));

        let value = serde_json::to_value(&opts).unwrap();
        assert_eq!(
            value,
            json!({
                "ttl": 30_000,
                "loop": 150,
                "throttle": 200,
                "webWorkerSupport": false,
                "prefix": "app"
            })
        );
    }

    #[test]
    fn test_invalid_options() {
        assert!(matches!(
            ChannelOptions::from_value(json!([1, 2])),
            Err(OptionsError::NotAnObject)
        ));
        assert_err!(ChannelOptions::from_value(json!({"throttle": "fast"})));
    }

    #[test]
    fn test_builders() {
        let opts = ChannelOptions::default()
            .with_throttle(Duration::ZERO)
            .with_ttl(Duration::from_secs(1))
            .with_extra("mode", json!("test"));
        assert_eq!(opts.throttle(), Duration::ZERO);
        assert_eq!(opts.ttl(), Duration::from_secs(1));
        assert_eq!(opts.extra("mode"), Some(&json!("test")));
    }
}
