//! Reference-counted registry of live subscriptions.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::channel::ChannelSubscription;
use crate::error::{Error, Result};
use crate::types::SubscriptionId;

/// One live subscription: the trigger it is bound to and the exclusively
/// owned channel-level handle released on unregister.
struct Entry {
    trigger: String,
    handle: Box<dyn ChannelSubscription>,
}

/// State guarded by a single mutex: register/release must update the id map
/// and the trigger reference sets atomically.
struct RegistryState {
    next_id: u64,
    subscriptions: HashMap<SubscriptionId, Entry>,
    triggers: HashMap<String, HashSet<SubscriptionId>>,
}

/// Tracks which subscription identities are bound to which trigger name.
///
/// Identities are strictly increasing from 0 and never reused. A trigger name
/// is present in the reference map iff at least one live subscription is
/// bound to it.
pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                next_id: 0,
                subscriptions: HashMap::new(),
                triggers: HashMap::new(),
            }),
        }
    }

    /// Record a new subscription, taking ownership of its channel handle.
    /// Never fails.
    pub fn register(&self, trigger: &str, handle: Box<dyn ChannelSubscription>) -> SubscriptionId {
        let mut state = self.state.lock();
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;

        state.subscriptions.insert(
            id,
            Entry {
                trigger: trigger.to_string(),
                handle,
            },
        );
        state
            .triggers
            .entry(trigger.to_string())
            .or_default()
            .insert(id);

        tracing::debug!(%id, trigger, "registered subscription");
        id
    }

    /// Release a subscription: unsubscribe its channel handle and drop it
    /// from the trigger's reference set, deleting the set when it empties.
    ///
    /// A second release of the same id fails with
    /// [`Error::SubscriptionNotFound`]; it is not a silent no-op.
    pub fn release(&self, id: SubscriptionId) -> Result<()> {
        let entry = {
            let mut state = self.state.lock();
            let entry = state
                .subscriptions
                .remove(&id)
                .ok_or(Error::SubscriptionNotFound(id))?;

            if let Some(refs) = state.triggers.get_mut(&entry.trigger) {
                refs.remove(&id);
                if refs.is_empty() {
                    state.triggers.remove(&entry.trigger);
                }
            }
            entry
        };

        tracing::debug!(%id, trigger = %entry.trigger, "released subscription");
        entry.handle.unsubscribe();
        Ok(())
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Number of live subscriptions bound to a trigger (0 when the trigger is
    /// absent from the reference map).
    pub fn trigger_ref_count(&self, trigger: &str) -> usize {
        self.state.lock().triggers.get(trigger).map_or(0, HashSet::len)
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
