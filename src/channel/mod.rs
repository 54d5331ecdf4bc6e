//! Transport channel boundary.
//!
//! The engine moves messages through a [`Channel`]: a named publish/subscribe
//! primitive owned by some transport (a document database's change
//! notifications, a message broker, an in-process broker). The engine never
//! reconnects, retries, or serializes; it assumes the connection it is handed
//! is already established and treats everything behind these traits as an
//! external collaborator.
//!
//! [`MemoryBroker`] is the in-process implementation used by tests, benches,
//! and single-process deployments.

mod memory;

pub use memory::{MemoryBroker, MemoryChannel};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{ChannelOptions, ConnectionListener, DeliveryCallback, SubscribeOptions};

/// An established transport connection from which channels are opened.
pub trait Connection: Send + Sync {
    /// Open a named channel on this connection.
    ///
    /// Channels opened with the same name share one delivery space. The
    /// listener, if any, observes `Ready` once the channel is open and
    /// `Error` on transport failures.
    fn open(
        &self,
        name: Option<&str>,
        options: &ChannelOptions,
        listener: Option<ConnectionListener>,
    ) -> Arc<dyn Channel>;
}

/// A named publish/subscribe channel on some transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Publish a payload to a trigger. Delivered to every callback currently
    /// subscribed to that trigger, each exactly once.
    async fn publish(&self, trigger: &str, payload: Value) -> Result<()>;

    /// Register a callback for a trigger, returning the handle that releases
    /// this one registration. Every call creates an independent channel-level
    /// subscription.
    fn subscribe(
        &self,
        trigger: &str,
        options: &SubscribeOptions,
        callback: DeliveryCallback,
    ) -> Result<Box<dyn ChannelSubscription>>;

    /// Close the channel. Publishing afterwards fails; callbacks registered
    /// at close time are not individually released.
    fn close(&self);
}

/// Handle to one channel-level subscription.
///
/// Exclusively owned by the registry entry that created it and released
/// exactly once.
pub trait ChannelSubscription: Send {
    /// Release this subscription; its callback is never invoked again.
    fn unsubscribe(self: Box<Self>);
}
