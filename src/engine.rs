//! The pub/sub engine: the façade consumers publish and subscribe through.

use std::sync::Arc;

use serde_json::Value;

use crate::channel::{Channel, Connection};
use crate::error::Result;
use crate::registry::SubscriptionRegistry;
use crate::sequence::EventSequence;
use crate::types::{
    ChannelOptions, ConnectionListener, Delivery, DeliveryCallback, MessageTransform,
    SubscribeOptions, SubscriptionId,
};

/// Engine construction options.
#[derive(Clone, Default)]
pub struct PubSubConfig {
    /// Logical namespace for this engine's channel. Engines sharing a
    /// connection and a name exchange messages.
    pub channel_name: Option<String>,

    /// Transport-level channel tuning.
    pub channel_options: ChannelOptions,

    /// Observer of transport `ready`/`error` events.
    pub connection_listener: Option<ConnectionListener>,

    /// Applied to every delivered data payload before it reaches a
    /// subscriber. Defaults to identity. Delivered errors bypass it.
    pub message_transform: Option<MessageTransform>,
}

struct Inner {
    channel: Arc<dyn Channel>,
    registry: SubscriptionRegistry,
    transform: MessageTransform,
}

/// The pub/sub façade.
///
/// Owns the subscription registry and the channel it opened from the
/// connection it was constructed with; all state is tied to this instance.
/// Cloning is cheap and shares the same engine.
#[derive(Clone)]
pub struct PubSub {
    inner: Arc<Inner>,
}

impl PubSub {
    /// Open a channel on an established connection and build an engine
    /// around it.
    pub fn new(connection: &dyn Connection, config: PubSubConfig) -> Self {
        let channel = connection.open(
            config.channel_name.as_deref(),
            &config.channel_options,
            config.connection_listener,
        );
        let transform = config
            .message_transform
            .unwrap_or_else(default_message_transform);

        Self {
            inner: Arc::new(Inner {
                channel,
                registry: SubscriptionRegistry::new(),
                transform,
            }),
        }
    }

    /// Publish a payload to a trigger.
    ///
    /// Forwarded to the transport as-is; a transport failure surfaces as
    /// [`Error::Transport`](crate::Error::Transport) and is never retried.
    pub async fn publish(&self, trigger: &str, payload: Value) -> Result<()> {
        tracing::debug!(trigger, "publish");
        self.inner.channel.publish(trigger, payload).await
    }

    /// Register a callback for every message delivered on a trigger.
    ///
    /// Each call creates its own channel-level subscription, even when other
    /// local subscribers already listen to the same trigger. Data deliveries
    /// pass through the message transform first; delivered errors reach
    /// `on_message` untouched.
    ///
    /// Fails only when `options.pattern` is set and the trigger is not a
    /// valid glob.
    pub fn subscribe<F>(
        &self,
        trigger: &str,
        options: &SubscribeOptions,
        on_message: F,
    ) -> Result<SubscriptionId>
    where
        F: Fn(Delivery) + Send + Sync + 'static,
    {
        tracing::debug!(trigger, pattern = options.pattern, "subscribe");
        let transform = Arc::clone(&self.inner.transform);
        let callback: DeliveryCallback = Arc::new(move |delivery: Delivery| match delivery {
            Ok(value) => on_message(Ok(transform(value))),
            Err(error) => on_message(Err(error)),
        });

        let handle = self.inner.channel.subscribe(trigger, options, callback)?;
        Ok(self.inner.registry.register(trigger, handle))
    }

    /// Release a subscription.
    ///
    /// Fails with [`Error::SubscriptionNotFound`](crate::Error::SubscriptionNotFound)
    /// when the id was already released or never issued.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        tracing::debug!(%id, "unsubscribe");
        self.inner.registry.release(id)
    }

    /// Bridge one or more triggers into a single pull-based async sequence.
    ///
    /// The sequence subscribes to each trigger and yields deliveries in
    /// arrival order. Call [`EventSequence::close`] (or drop the sequence) to
    /// release its subscriptions.
    pub fn sequence<I, S>(&self, triggers: I, options: &SubscribeOptions) -> Result<EventSequence>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EventSequence::new(self.clone(), triggers, options)
    }

    /// Close the underlying channel.
    ///
    /// Outstanding subscriptions are *not* walked and released; callers that
    /// care about per-subscription cleanup must unsubscribe first.
    pub fn close(&self) {
        self.inner.channel.close();
    }

    /// Number of live subscriptions on this engine.
    pub fn subscription_count(&self) -> usize {
        self.inner.registry.subscription_count()
    }

    /// Number of live subscriptions bound to a trigger.
    pub fn trigger_ref_count(&self, trigger: &str) -> usize {
        self.inner.registry.trigger_ref_count(trigger)
    }
}

/// Identity transform that traces each payload it passes through.
fn default_message_transform() -> MessageTransform {
    Arc::new(|message: Value| {
        tracing::trace!(?message, "default message transform");
        message
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryBroker;
    use crate::types::DeliveryError;
    use parking_lot::Mutex;
    use serde_json::json;

    fn sink() -> (
        Arc<Mutex<Vec<Delivery>>>,
        impl Fn(Delivery) + Send + Sync + 'static,
    ) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&received);
        (received, move |d: Delivery| out.lock().push(d))
    }

    #[tokio::test]
    async fn test_subscribe_publish_roundtrip() {
        let broker = MemoryBroker::new();
        let pubsub = PubSub::new(&broker, PubSubConfig::default());
        let (received, on_message) = sink();

        let id = pubsub
            .subscribe("Posts", &SubscribeOptions::default(), on_message)
            .unwrap();
        pubsub
            .publish("Posts", json!({"timestamp": "2024-01-01T00:00:00Z"}))
            .await
            .unwrap();

        {
            let received = received.lock();
            assert_eq!(received.len(), 1);
            assert_eq!(
                received[0].as_ref().unwrap()["timestamp"],
                "2024-01-01T00:00:00Z"
            );
        }
        pubsub.unsubscribe(id).unwrap();
    }

    #[tokio::test]
    async fn test_each_subscribe_creates_its_own_channel_subscription() {
        let broker = MemoryBroker::new();
        let pubsub = PubSub::new(&broker, PubSubConfig::default());
        let (_r1, cb1) = sink();
        let (_r2, cb2) = sink();

        pubsub.subscribe("Posts", &SubscribeOptions::default(), cb1).unwrap();
        pubsub.subscribe("Posts", &SubscribeOptions::default(), cb2).unwrap();

        // No transport-level sharing
        assert_eq!(broker.subscriber_count(None, "Posts"), 2);
    }

    #[tokio::test]
    async fn test_transform_is_applied_per_subscriber() {
        let broker = MemoryBroker::new();
        let transform: MessageTransform = Arc::new(|value| json!({ "wrapped": value }));
        let pubsub = PubSub::new(
            &broker,
            PubSubConfig {
                message_transform: Some(transform),
                ..Default::default()
            },
        );
        let (r1, cb1) = sink();
        let (r2, cb2) = sink();
        pubsub.subscribe("Posts", &SubscribeOptions::default(), cb1).unwrap();
        pubsub.subscribe("Posts", &SubscribeOptions::default(), cb2).unwrap();

        pubsub.publish("Posts", json!(1)).await.unwrap();

        for received in [r1, r2] {
            let received = received.lock();
            assert_eq!(received[0].as_ref().unwrap()["wrapped"], 1);
        }
    }

    #[tokio::test]
    async fn test_delivered_errors_bypass_transform() {
        let broker = MemoryBroker::new();
        let transform: MessageTransform = Arc::new(|_| panic!("transform must not see errors"));
        let pubsub = PubSub::new(
            &broker,
            PubSubConfig {
                message_transform: Some(transform),
                ..Default::default()
            },
        );
        let (received, on_message) = sink();
        pubsub
            .subscribe("Posts", &SubscribeOptions::default(), on_message)
            .unwrap();

        broker.emit_error(None, "Posts", DeliveryError::new("cursor died"));

        let received = received.lock();
        assert_eq!(received[0].as_ref().unwrap_err().message, "cursor died");
    }

    #[tokio::test]
    async fn test_unsubscribed_callback_is_not_invoked() {
        let broker = MemoryBroker::new();
        let pubsub = PubSub::new(&broker, PubSubConfig::default());
        let (r1, cb1) = sink();
        let (r2, cb2) = sink();
        let first = pubsub.subscribe("Posts", &SubscribeOptions::default(), cb1).unwrap();
        let _second = pubsub.subscribe("Posts", &SubscribeOptions::default(), cb2).unwrap();

        pubsub.unsubscribe(first).unwrap();
        pubsub.publish("Posts", json!("only one")).await.unwrap();

        assert!(r1.lock().is_empty());
        assert_eq!(r2.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_close_leaves_subscriptions_registered() {
        let broker = MemoryBroker::new();
        let pubsub = PubSub::new(&broker, PubSubConfig::default());
        let (_received, on_message) = sink();
        pubsub
            .subscribe("Posts", &SubscribeOptions::default(), on_message)
            .unwrap();

        pubsub.close();

        // close releases the transport only; registry cleanup stays with the caller
        assert_eq!(pubsub.subscription_count(), 1);
        assert!(pubsub.publish("Posts", json!("x")).await.is_err());
    }
}
