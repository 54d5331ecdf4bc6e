//! # Fanout
//!
//! A reference-counted publish/subscribe fan-out layer that bridges a
//! callback-driven transport channel to pull-based async sequences.
//!
//! ## Core Concepts
//!
//! - **Triggers**: named message channels; consumers subscribe by name
//! - **Subscriptions**: one consumer's interest in one trigger, identified by
//!   an opaque id and reference-counted per trigger
//! - **Sequences**: suspend/resume pull adapters presenting one or more
//!   triggers as a single FIFO async stream
//! - **Channels**: the transport boundary; an in-process broker ships with
//!   the crate, anything with publish/subscribe/close can plug in
//!
//! ## Example
//!
//! ```ignore
//! use fanout::{MemoryBroker, PubSub, PubSubConfig, SubscribeOptions};
//! use serde_json::json;
//!
//! let broker = MemoryBroker::new();
//! let pubsub = PubSub::new(&broker, PubSubConfig::default());
//!
//! // Callback subscriber
//! let id = pubsub.subscribe("Posts", &SubscribeOptions::default(), |delivery| {
//!     println!("{delivery:?}");
//! })?;
//!
//! // Pull-based consumer
//! let mut seq = pubsub.sequence(["Posts"], &SubscribeOptions::default())?;
//! pubsub.publish("Posts", json!({"text": "hello"})).await?;
//! let delivery = seq.next().await;
//!
//! seq.close();
//! pubsub.unsubscribe(id)?;
//! ```

pub mod channel;
pub mod engine;
pub mod error;
pub mod registry;
pub mod sequence;
pub mod types;

// Re-exports
pub use channel::{Channel, ChannelSubscription, Connection, MemoryBroker, MemoryChannel};
pub use engine::{PubSub, PubSubConfig};
pub use error::{Error, Result};
pub use registry::SubscriptionRegistry;
pub use sequence::{EventSequence, SequenceCloser};
pub use types::{
    ChannelOptions, ConnectionEvent, ConnectionListener, Delivery, DeliveryCallback,
    DeliveryError, MessageTransform, SubscribeOptions, SubscriptionId,
};
