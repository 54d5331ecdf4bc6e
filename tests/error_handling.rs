//! Error handling and edge case tests.

use std::sync::Arc;

use fanout::{
    ConnectionEvent, ConnectionListener, Error, MemoryBroker, PubSub, PubSubConfig,
    SubscribeOptions, SubscriptionId,
};
use parking_lot::Mutex;
use serde_json::json;

fn engine(broker: &MemoryBroker) -> PubSub {
    PubSub::new(broker, PubSubConfig::default())
}

// --- Unsubscribe Errors ---

#[test]
fn test_double_unsubscribe_fails_with_not_found() {
    let broker = MemoryBroker::new();
    let pubsub = engine(&broker);

    let first = pubsub
        .subscribe("Posts", &SubscribeOptions::default(), |_| {})
        .unwrap();
    let second = pubsub
        .subscribe("Posts", &SubscribeOptions::default(), |_| {})
        .unwrap();

    pubsub.unsubscribe(first).unwrap();
    let err = pubsub.unsubscribe(first).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("There is no subscription of id \"{first}\"")
    );

    // The other subscription is untouched
    pubsub.unsubscribe(second).unwrap();
}

#[test]
fn test_unsubscribe_unknown_id_fails() {
    let broker = MemoryBroker::new();
    let pubsub = engine(&broker);

    let result = pubsub.unsubscribe(SubscriptionId(123));
    assert!(matches!(result, Err(Error::SubscriptionNotFound(_))));
}

// --- Transport Errors ---

#[tokio::test]
async fn test_publish_after_close_is_a_transport_error() {
    let broker = MemoryBroker::new();
    let pubsub = engine(&broker);

    pubsub.close();
    let result = pubsub.publish("Posts", json!("x")).await;
    assert!(matches!(result, Err(Error::Transport(_))));
}

#[tokio::test]
async fn test_connection_listener_observes_ready_and_error() {
    let broker = MemoryBroker::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let listener: ConnectionListener = Arc::new(move |event| sink.lock().push(event.clone()));

    let pubsub = PubSub::new(
        &broker,
        PubSubConfig {
            connection_listener: Some(listener),
            ..Default::default()
        },
    );
    assert!(matches!(
        events.lock().as_slice(),
        [ConnectionEvent::Ready { .. }]
    ));

    pubsub.close();
    pubsub.publish("Posts", json!("x")).await.unwrap_err();

    let events = events.lock();
    assert!(matches!(events.last(), Some(ConnectionEvent::Error { .. })));
}

// --- Pattern Errors ---

#[test]
fn test_invalid_glob_pattern_rejected_on_subscribe() {
    let broker = MemoryBroker::new();
    let pubsub = engine(&broker);

    let result = pubsub.subscribe("[invalid[", &SubscribeOptions::pattern(), |_| {});
    assert!(matches!(result, Err(Error::InvalidPattern(_))));
    assert_eq!(pubsub.subscription_count(), 0);
}

#[test]
fn test_failed_sequence_construction_rolls_back_subscriptions() {
    let broker = MemoryBroker::new();
    let pubsub = engine(&broker);

    // Second trigger is an invalid glob; the first subscription must not leak
    let result = pubsub.sequence(["valid*", "[invalid["], &SubscribeOptions::pattern());
    assert!(matches!(result, Err(Error::InvalidPattern(_))));
    assert_eq!(pubsub.subscription_count(), 0);
}

// --- Close semantics ---

#[tokio::test]
async fn test_close_does_not_release_outstanding_subscriptions() {
    let broker = MemoryBroker::new();
    let pubsub = engine(&broker);
    let id = pubsub
        .subscribe("Posts", &SubscribeOptions::default(), |_| {})
        .unwrap();

    pubsub.close();

    // Registry is untouched; the caller still owns the release
    assert_eq!(pubsub.subscription_count(), 1);
    pubsub.unsubscribe(id).unwrap();
    assert_eq!(pubsub.subscription_count(), 0);
}
