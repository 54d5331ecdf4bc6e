//! Pull adapter: bridges callback deliveries into a suspending async
//! sequence.
//!
//! An [`EventSequence`] subscribes to one or more triggers and presents their
//! deliveries as a single FIFO stream. Messages arriving before the consumer
//! asks for them are buffered; a consumer asking before anything arrived is
//! suspended until the next delivery or until the sequence is closed.
//!
//! The state machine is deliberately explicit: an owned queue, a single
//! parked-waker slot, and a monotonic closed flag. Single-consumer pull
//! discipline is enforced by `next()` taking `&mut self`.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use futures_core::Stream;
use parking_lot::Mutex;

use crate::engine::PubSub;
use crate::error::Result;
use crate::types::{Delivery, SubscribeOptions, SubscriptionId};

struct SequenceState {
    queue: VecDeque<Delivery>,
    waker: Option<Waker>,
    closed: bool,
}

struct SequenceShared {
    pubsub: PubSub,
    /// Subscriptions this sequence created, drained on close.
    ids: Mutex<Vec<SubscriptionId>>,
    state: Mutex<SequenceState>,
}

impl SequenceShared {
    /// Idempotent close: discard the buffer, wake a suspended consumer so it
    /// observes end-of-stream, and release every subscription.
    fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.queue.clear();
            if let Some(waker) = state.waker.take() {
                waker.wake();
            }
        }

        for id in self.ids.lock().drain(..) {
            if let Err(error) = self.pubsub.unsubscribe(id) {
                // Racing release is tolerated here
                tracing::trace!(%id, %error, "sequence subscription already released");
            }
        }
    }
}

/// A pull-based async sequence over one or more triggers.
///
/// Yields deliveries in arrival order, interleaving triggers in whatever
/// order the transport invoked their callbacks. Implements
/// [`futures_core::Stream`]; [`next()`](EventSequence::next) is also provided
/// inherently so no extension trait is needed.
///
/// [`close()`](EventSequence::close) releases the sequence's subscriptions;
/// dropping the sequence does the same. A sequence that is never closed and
/// never dropped holds one channel-level subscription per trigger.
pub struct EventSequence {
    shared: Arc<SequenceShared>,
}

impl EventSequence {
    pub(crate) fn new<I, S>(pubsub: PubSub, triggers: I, options: &SubscribeOptions) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let shared = Arc::new(SequenceShared {
            pubsub,
            ids: Mutex::new(Vec::new()),
            state: Mutex::new(SequenceState {
                queue: VecDeque::new(),
                waker: None,
                closed: false,
            }),
        });

        for trigger in triggers {
            let trigger = trigger.into();
            let sink = Arc::clone(&shared);
            let subscribed = shared.pubsub.subscribe(&trigger, options, move |delivery| {
                let mut state = sink.state.lock();
                if state.closed {
                    // Deliveries racing a close are dropped, not buffered
                    return;
                }
                state.queue.push_back(delivery);
                if let Some(waker) = state.waker.take() {
                    waker.wake();
                }
            });

            match subscribed {
                Ok(id) => shared.ids.lock().push(id),
                Err(error) => {
                    // Roll back the subscriptions already created
                    shared.close();
                    return Err(error);
                }
            }
        }

        Ok(Self { shared })
    }

    /// Produce the next delivery.
    ///
    /// Resolves immediately with a buffered delivery when one is waiting,
    /// suspends until one arrives otherwise, and resolves with `None` once
    /// the sequence is closed. With no publish and no close, the suspension
    /// is unbounded; compose an external timeout if you need one.
    pub async fn next(&mut self) -> Option<Delivery> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    /// Close the sequence.
    ///
    /// Idempotent. Discards buffered deliveries, resolves a suspended
    /// [`next()`](EventSequence::next) with `None`, and releases every
    /// subscription this sequence created.
    pub fn close(&self) {
        self.shared.close();
    }

    /// A detached handle that can close this sequence from another task,
    /// for example while the consumer is suspended in
    /// [`next()`](EventSequence::next).
    pub fn closer(&self) -> SequenceCloser {
        SequenceCloser {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Stream for EventSequence {
    type Item = Delivery;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Delivery>> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Poll::Ready(None);
        }
        if let Some(delivery) = state.queue.pop_front() {
            return Poll::Ready(Some(delivery));
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for EventSequence {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Closes an [`EventSequence`] from outside its consumer.
#[derive(Clone)]
pub struct SequenceCloser {
    shared: Arc<SequenceShared>,
}

impl SequenceCloser {
    /// Same transition as [`EventSequence::close`]; idempotent.
    pub fn close(&self) {
        self.shared.close();
    }
}
