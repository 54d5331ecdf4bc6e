//! Core types shared across the crate.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Unique identifier for a subscription.
///
/// Identities are allocated strictly increasing from 0 by the engine that
/// owns them and are never reused for the lifetime of that engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An error signal delivered on a trigger in place of data.
///
/// This is a data-plane value, not a crate-level failure: the transport (or a
/// publisher) signals that a trigger failed, and consumers receive it through
/// the same path as data so they can tell the two apart. Delivered errors
/// bypass the message transform.
#[derive(Clone, Debug, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct DeliveryError {
    pub message: String,
}

impl DeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A single value delivered to a subscriber: application data or a delivered
/// error signal.
pub type Delivery = Result<Value, DeliveryError>;

/// Callback invoked by a channel for every delivery on a subscribed trigger.
pub type DeliveryCallback = Arc<dyn Fn(Delivery) + Send + Sync>;

/// Pure function applied to every delivered data payload before it reaches a
/// subscriber. Each subscriber gets its own invocation on its own copy of the
/// payload; delivered errors are never passed through it.
pub type MessageTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Callback observing transport lifecycle events.
pub type ConnectionListener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Transport lifecycle events surfaced to the connection listener.
#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    /// The channel is open and ready to deliver.
    Ready { channel: String },
    /// The transport reported an error.
    Error { message: String },
}

/// Options for a single subscription or sequence.
#[derive(Clone, Debug, Default)]
pub struct SubscribeOptions {
    /// Treat the trigger name as a glob pattern (`"SECOND*"`, `"a?c"`)
    /// matching any published trigger.
    pub pattern: bool,
}

impl SubscribeOptions {
    /// Subscribe to triggers matching a glob pattern.
    pub fn pattern() -> Self {
        Self { pattern: true }
    }
}

/// Transport-level channel tuning.
///
/// Meaningful to transports that buffer at the channel level (the reference
/// transport sizes a capped collection with these); the in-process transport
/// delivers synchronously and treats them as advisory.
#[derive(Clone, Copy, Debug)]
pub struct ChannelOptions {
    /// Channel buffer size in bytes.
    pub size: usize,
    /// Maximum number of buffered messages.
    pub max: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            size: 100_000,
            max: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_id_display() {
        assert_eq!(SubscriptionId(42).to_string(), "42");
    }

    #[test]
    fn test_delivery_error_display() {
        let err = DeliveryError::new("change stream lost");
        assert_eq!(err.to_string(), "change stream lost");
    }

    #[test]
    fn test_channel_options_default() {
        let opts = ChannelOptions::default();
        assert_eq!(opts.size, 100_000);
        assert_eq!(opts.max, 1000);
    }
}
