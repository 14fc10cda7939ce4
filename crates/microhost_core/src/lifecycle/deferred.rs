//! Resolve-once hand-off signal and the singular-mode sequencer built on it.
//!
//! # Invariants
//! - A [`Deferred`] resolves at most once; later `resolve` calls are no-ops.
//! - Waiting on a resolved (or dropped) signal completes immediately.
//! - The sequencer only ever holds the signal of the latest mount cycle.

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use log::debug;
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Single-shot completion signal with any number of waiters.
pub struct Deferred {
    sender: RefCell<Option<oneshot::Sender<()>>>,
    receiver: Shared<oneshot::Receiver<()>>,
}

impl Debug for Deferred {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl Deferred {
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            sender: RefCell::new(Some(sender)),
            receiver: receiver.shared(),
        }
    }

    /// Resolves the signal. Returns `false` if it was already resolved.
    pub fn resolve(&self) -> bool {
        match self.sender.borrow_mut().take() {
            Some(sender) => {
                // A send error only means every waiter is gone.
                let _ = sender.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.sender.borrow().is_none()
    }

    /// Completes once the signal is resolved.
    pub async fn wait(&self) {
        // Cancellation means the sender was dropped, which also ends the wait.
        let _ = self.receiver.clone().await;
    }
}

/// Serializes mount cycles when singular mode is on.
#[derive(Debug, Default)]
pub struct SingularSequencer {
    current: RefCell<Option<Rc<Deferred>>>,
}

thread_local! {
    static DEFAULT_SEQUENCER: Rc<SingularSequencer> = Rc::new(SingularSequencer::default());
}

/// Process-wide sequencer used when no sequencer is injected.
pub fn default_sequencer() -> Rc<SingularSequencer> {
    DEFAULT_SEQUENCER.with(Rc::clone)
}

impl SingularSequencer {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Waits until the latest armed mount cycle has fully unmounted.
    pub async fn wait_for_handoff(&self) {
        loop {
            let pending = self.current.borrow().clone();
            match pending {
                Some(deferred) if !deferred.is_resolved() => {
                    debug!("event=singular_wait module=lifecycle status=start");
                    deferred.wait().await;
                }
                _ => return,
            }
        }
    }

    /// Starts a new cycle and returns the signal its unmount must resolve.
    pub fn arm(&self) -> Rc<Deferred> {
        let deferred = Rc::new(Deferred::new());
        *self.current.borrow_mut() = Some(deferred.clone());
        deferred
    }

    /// Whether a mounted app currently holds the hand-off.
    pub fn is_held(&self) -> bool {
        self.current
            .borrow()
            .as_ref()
            .is_some_and(|deferred| !deferred.is_resolved())
    }
}
