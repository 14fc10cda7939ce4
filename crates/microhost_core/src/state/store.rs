//! Cross-app key/value store.
//!
//! # Responsibility
//! - Hold one process-wide JSON object shared by host and apps.
//! - Deliver change notifications to at most one callback per consumer.
//!
//! # Invariants
//! - The key set is fixed by the latest privileged `initialize`; other
//!   consumers may only update keys that already exist.
//! - Every value handed to a callback is an independent copy.
//! - All subscribers of one change observe the same `(new, previous)` pair
//!   before the triggering call returns.
//! - No internal borrow is held while callbacks run, so a callback may
//!   re-enter the store.

use log::{debug, warn};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use uuid::Uuid;

/// Store content: a JSON object.
pub type StateMap = Map<String, Value>;

/// Change callback receiving `(new_state, previous_state)`.
pub type StateCallback = Rc<dyn Fn(StateMap, StateMap)>;

#[derive(Default)]
struct StoreInner {
    state: StateMap,
    // Allocation `state` was copied from; cleared once an update diverges.
    held_source: Option<Rc<StateMap>>,
    // Insertion ordered; notification follows registration order.
    deps: Vec<(String, StateCallback)>,
}

/// Shared state store. Create one per composition root, or use
/// [`default_store`] for the process-wide instance.
#[derive(Default)]
pub struct GlobalStateStore {
    inner: RefCell<StoreInner>,
}

impl Debug for GlobalStateStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("GlobalStateStore")
            .field("keys", &inner.state.keys().collect::<Vec<_>>())
            .field("subscribers", &inner.deps.len())
            .finish()
    }
}

thread_local! {
    static DEFAULT_STORE: Rc<GlobalStateStore> = GlobalStateStore::new();
}

/// Returns the process-wide store used when no store is injected.
pub fn default_store() -> Rc<GlobalStateStore> {
    DEFAULT_STORE.with(Rc::clone)
}

impl GlobalStateStore {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Replaces the store content with a copy of `initial`, fixing the key
    /// set, and returns a privileged handle.
    ///
    /// Passing the exact allocation the current content was copied from is a
    /// no-op. After any applied update the content no longer matches it, so
    /// the same allocation initializes again.
    pub fn initialize(self: &Rc<Self>, initial: impl Into<Rc<StateMap>>) -> StateHandle {
        let initial = initial.into();
        let handle = self.handle(&format!("global-{}", Uuid::new_v4()), true);

        let unchanged = {
            let inner = self.inner.borrow();
            inner
                .held_source
                .as_ref()
                .is_some_and(|previous| Rc::ptr_eq(previous, &initial))
        };
        if unchanged {
            warn!("event=state_initialize module=state status=warn code=state_unchanged");
            return handle;
        }

        let (next, previous) = {
            let mut inner = self.inner.borrow_mut();
            let previous = std::mem::replace(&mut inner.state, initial.as_ref().clone());
            inner.held_source = Some(initial);
            (inner.state.clone(), previous)
        };
        debug!(
            "event=state_initialize module=state status=ok keys={}",
            next.len()
        );
        self.emit(&next, &previous);
        handle
    }

    /// Returns a handle bound to `consumer_id`.
    pub fn handle(self: &Rc<Self>, consumer_id: &str, privileged: bool) -> StateHandle {
        StateHandle {
            store: Rc::clone(self),
            consumer_id: consumer_id.to_string(),
            privileged,
        }
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> StateMap {
        self.inner.borrow().state.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().deps.len()
    }

    pub fn is_subscribed(&self, consumer_id: &str) -> bool {
        self.inner
            .borrow()
            .deps
            .iter()
            .any(|(id, _)| id == consumer_id)
    }

    fn subscribe(&self, consumer_id: &str, callback: StateCallback, fire_immediately: bool) {
        {
            let mut inner = self.inner.borrow_mut();
            match inner.deps.iter_mut().find(|(id, _)| id == consumer_id) {
                Some(entry) => {
                    warn!(
                        "event=state_subscribe module=state status=warn code=subscription_overwritten consumer_id={consumer_id}"
                    );
                    entry.1 = callback.clone();
                }
                None => inner.deps.push((consumer_id.to_string(), callback.clone())),
            }
        }

        if fire_immediately {
            let snapshot = self.snapshot();
            callback(snapshot.clone(), snapshot);
        }
    }

    fn update(&self, consumer_id: &str, privileged: bool, partial: StateMap) -> bool {
        let (next, previous) = {
            let mut inner = self.inner.borrow_mut();
            let previous = inner.state.clone();
            let mut applied = 0usize;
            for (key, value) in partial {
                if privileged || inner.state.contains_key(&key) {
                    inner.state.insert(key, value);
                    applied += 1;
                } else {
                    warn!(
                        "event=state_update module=state status=warn code=state_key_undeclared consumer_id={consumer_id} key={key}"
                    );
                }
            }
            if applied == 0 {
                warn!(
                    "event=state_update module=state status=warn code=state_unchanged consumer_id={consumer_id}"
                );
                return false;
            }
            inner.held_source = None;
            (inner.state.clone(), previous)
        };

        debug!("event=state_update module=state status=ok consumer_id={consumer_id}");
        self.emit(&next, &previous);
        true
    }

    fn unsubscribe(&self, consumer_id: &str) -> bool {
        self.inner
            .borrow_mut()
            .deps
            .retain(|(id, _)| id != consumer_id);
        true
    }

    fn emit(&self, next: &StateMap, previous: &StateMap) {
        let deps = self
            .inner
            .borrow()
            .deps
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect::<Vec<_>>();
        for callback in deps {
            callback(next.clone(), previous.clone());
        }
    }
}

/// Per-consumer view of the store handed to apps as `setGlobalState` /
/// `onGlobalStateChange`.
#[derive(Clone)]
pub struct StateHandle {
    store: Rc<GlobalStateStore>,
    consumer_id: String,
    privileged: bool,
}

impl Debug for StateHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateHandle")
            .field("consumer_id", &self.consumer_id)
            .field("privileged", &self.privileged)
            .finish()
    }
}

impl StateHandle {
    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Registers (or replaces) this consumer's callback. With
    /// `fire_immediately`, the callback runs once now with the current
    /// snapshot passed twice.
    pub fn subscribe(&self, callback: impl Fn(StateMap, StateMap) + 'static, fire_immediately: bool) {
        self.store
            .subscribe(&self.consumer_id, Rc::new(callback), fire_immediately);
    }

    /// Applies `partial` and notifies subscribers. Returns whether any key
    /// was applied.
    pub fn update(&self, partial: StateMap) -> bool {
        self.store.update(&self.consumer_id, self.privileged, partial)
    }

    pub fn unsubscribe(&self) -> bool {
        self.store.unsubscribe(&self.consumer_id)
    }

    pub fn snapshot(&self) -> StateMap {
        self.store.snapshot()
    }
}
