//! In-process transport: a broker of named channels delivering synchronously.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use parking_lot::RwLock;
use serde_json::Value;

use super::{Channel, ChannelSubscription, Connection};
use crate::error::{Error, Result};
use crate::types::{
    ChannelOptions, ConnectionEvent, ConnectionListener, Delivery, DeliveryCallback, DeliveryError,
    SubscribeOptions,
};

/// Channel name used when none is configured.
const DEFAULT_CHANNEL_NAME: &str = "fanout";

/// One registered callback on a space.
struct Slot {
    token: u64,
    callback: DeliveryCallback,
}

/// A callback registered under a glob pattern.
struct PatternSlot {
    token: u64,
    matcher: GlobMatcher,
    callback: DeliveryCallback,
}

/// Mutable subscriber state of one delivery space.
#[derive(Default)]
struct SpaceState {
    next_token: u64,
    exact: HashMap<String, Vec<Slot>>,
    patterns: Vec<PatternSlot>,
}

/// The delivery space shared by every channel opened under one name.
struct ChannelSpace {
    name: String,
    state: RwLock<SpaceState>,
}

impl ChannelSpace {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(SpaceState::default()),
        }
    }

    /// Collect the callbacks interested in a trigger and invoke them with
    /// their own clone of the delivery. Callbacks run outside the lock so
    /// they may subscribe or unsubscribe reentrantly.
    fn deliver(&self, trigger: &str, delivery: &Delivery) {
        let callbacks: Vec<DeliveryCallback> = {
            let state = self.state.read();
            let exact = state
                .exact
                .get(trigger)
                .into_iter()
                .flatten()
                .map(|slot| Arc::clone(&slot.callback));
            let patterns = state
                .patterns
                .iter()
                .filter(|slot| slot.matcher.is_match(trigger))
                .map(|slot| Arc::clone(&slot.callback));
            exact.chain(patterns).collect()
        };

        tracing::trace!(
            channel = %self.name,
            trigger,
            subscribers = callbacks.len(),
            "delivering"
        );
        for callback in callbacks {
            callback(delivery.clone());
        }
    }

    fn add_exact(&self, trigger: &str, callback: DeliveryCallback) -> u64 {
        let mut state = self.state.write();
        let token = state.next_token;
        state.next_token += 1;
        state
            .exact
            .entry(trigger.to_string())
            .or_default()
            .push(Slot { token, callback });
        token
    }

    fn add_pattern(&self, matcher: GlobMatcher, callback: DeliveryCallback) -> u64 {
        let mut state = self.state.write();
        let token = state.next_token;
        state.next_token += 1;
        state.patterns.push(PatternSlot {
            token,
            matcher,
            callback,
        });
        token
    }

    fn remove_exact(&self, trigger: &str, token: u64) {
        let mut state = self.state.write();
        if let Some(slots) = state.exact.get_mut(trigger) {
            slots.retain(|slot| slot.token != token);
            if slots.is_empty() {
                state.exact.remove(trigger);
            }
        }
    }

    fn remove_pattern(&self, token: u64) {
        self.state.write().patterns.retain(|slot| slot.token != token);
    }
}

/// Handle to one registration on a [`ChannelSpace`].
struct MemorySubscription {
    space: Arc<ChannelSpace>,
    trigger: String,
    token: u64,
    pattern: bool,
}

impl ChannelSubscription for MemorySubscription {
    fn unsubscribe(self: Box<Self>) {
        if self.pattern {
            self.space.remove_pattern(self.token);
        } else {
            self.space.remove_exact(&self.trigger, self.token);
        }
    }
}

/// In-process broker of named delivery spaces.
///
/// Implements [`Connection`]: each `open` call yields a channel, and channels
/// opened under the same name deliver to each other's subscribers. Useful on
/// its own for single-process deployments and as the transport for tests.
#[derive(Default)]
pub struct MemoryBroker {
    spaces: RwLock<HashMap<String, Arc<ChannelSpace>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn space(&self, name: &str) -> Arc<ChannelSpace> {
        if let Some(space) = self.spaces.read().get(name) {
            return Arc::clone(space);
        }
        let mut spaces = self.spaces.write();
        Arc::clone(
            spaces
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(ChannelSpace::new(name))),
        )
    }

    /// Deliver an error signal to every subscriber of a trigger, as a real
    /// transport does when its notification stream fails. Consumers receive
    /// it as `Err(DeliveryError)`; the message transform never sees it.
    pub fn emit_error(&self, name: Option<&str>, trigger: &str, error: DeliveryError) {
        let space = self.space(name.unwrap_or(DEFAULT_CHANNEL_NAME));
        space.deliver(trigger, &Err(error));
    }

    /// Number of exact subscribers currently registered for a trigger.
    pub fn subscriber_count(&self, name: Option<&str>, trigger: &str) -> usize {
        let space = self.space(name.unwrap_or(DEFAULT_CHANNEL_NAME));
        let state = space.state.read();
        state.exact.get(trigger).map_or(0, Vec::len)
    }
}

impl Connection for MemoryBroker {
    fn open(
        &self,
        name: Option<&str>,
        options: &ChannelOptions,
        listener: Option<ConnectionListener>,
    ) -> Arc<dyn Channel> {
        let name = name.unwrap_or(DEFAULT_CHANNEL_NAME);
        let space = self.space(name);
        tracing::debug!(channel = name, ?options, "opening memory channel");

        if let Some(ref listener) = listener {
            listener(&ConnectionEvent::Ready {
                channel: name.to_string(),
            });
        }

        Arc::new(MemoryChannel {
            space,
            options: *options,
            listener,
            closed: AtomicBool::new(false),
        })
    }
}

/// One view onto a broker's delivery space.
pub struct MemoryChannel {
    space: Arc<ChannelSpace>,
    options: ChannelOptions,
    listener: Option<ConnectionListener>,
    closed: AtomicBool,
}

impl MemoryChannel {
    /// The tuning this channel was opened with. Advisory here: delivery is
    /// synchronous and nothing is buffered at the transport level.
    pub fn options(&self) -> ChannelOptions {
        self.options
    }

    fn notify_error(&self, message: &str) {
        if let Some(ref listener) = self.listener {
            listener(&ConnectionEvent::Error {
                message: message.to_string(),
            });
        }
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn publish(&self, trigger: &str, payload: Value) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            let message = format!("channel \"{}\" is closed", self.space.name);
            self.notify_error(&message);
            return Err(Error::Transport(message));
        }
        self.space.deliver(trigger, &Ok(payload));
        Ok(())
    }

    fn subscribe(
        &self,
        trigger: &str,
        options: &SubscribeOptions,
        callback: DeliveryCallback,
    ) -> Result<Box<dyn ChannelSubscription>> {
        let (token, pattern) = if options.pattern {
            let matcher = Glob::new(trigger)?.compile_matcher();
            (self.space.add_pattern(matcher, callback), true)
        } else {
            (self.space.add_exact(trigger, callback), false)
        };

        Ok(Box::new(MemorySubscription {
            space: Arc::clone(&self.space),
            trigger: trigger.to_string(),
            token,
            pattern,
        }))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        tracing::debug!(channel = %self.space.name, "memory channel closed");
    }
}
