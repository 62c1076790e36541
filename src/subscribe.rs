//! Change notification with exact scope matching.
//!
//! Consumers subscribe to their own field's scope so a keystroke in one field
//! never wakes listeners bound to another. Delivery is synchronous in
//! subscription order; a re-entrant notify for a scope that is already being
//! notified is queued and flushed once after the current batch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::registry::FieldKey;

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Scope {
    Form,
    Field(FieldKey),
}

impl Scope {
    pub fn field(name: impl Into<FieldKey>) -> Self {
        Scope::Field(name.into())
    }
}

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct BusState {
    next_id: u64,
    listeners: BTreeMap<Scope, Vec<(u64, Listener)>>,
    notifying: BTreeSet<Scope>,
    queued: BTreeSet<Scope>,
}

#[derive(Clone, Default)]
pub struct SubscriptionBus {
    state: Arc<Mutex<BusState>>,
}

impl SubscriptionBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, scope: Scope, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        let mut state = lock_bus(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        state
            .listeners
            .entry(scope.clone())
            .or_default()
            .push((id, Arc::new(listener)));
        Subscription {
            bus: Arc::downgrade(&self.state),
            scope,
            id,
        }
    }

    /// Invokes all listeners whose scope matches exactly. Listeners run
    /// outside the bus lock, so they may subscribe, unsubscribe, or trigger
    /// further notifications while the batch is in flight.
    pub fn notify(&self, scope: &Scope) {
        loop {
            let batch: Vec<Listener> = {
                let mut state = lock_bus(&self.state);
                if state.notifying.contains(scope) {
                    state.queued.insert(scope.clone());
                    return;
                }
                state.notifying.insert(scope.clone());
                state
                    .listeners
                    .get(scope)
                    .map(|entries| entries.iter().map(|(_, listener)| Arc::clone(listener)).collect())
                    .unwrap_or_default()
            };

            for listener in batch {
                listener();
            }

            let mut state = lock_bus(&self.state);
            state.notifying.remove(scope);
            if !state.queued.remove(scope) {
                return;
            }
            // A listener re-entered notify for this scope; flush once more.
        }
    }

    pub(crate) fn clear_scope(&self, scope: &Scope) {
        lock_bus(&self.state).listeners.remove(scope);
    }

    #[cfg(test)]
    fn listener_count(&self, scope: &Scope) -> usize {
        lock_bus(&self.state)
            .listeners
            .get(scope)
            .map_or(0, Vec::len)
    }
}

fn lock_bus(state: &Mutex<BusState>) -> MutexGuard<'_, BusState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// RAII subscription handle; dropping it removes the listener.
#[must_use = "dropping the subscription removes the listener"]
pub struct Subscription {
    bus: Weak<Mutex<BusState>>,
    scope: Scope,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.bus.upgrade() {
            let mut state = lock_bus(&state);
            if let Some(entries) = state.listeners.get_mut(&self.scope) {
                entries.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
