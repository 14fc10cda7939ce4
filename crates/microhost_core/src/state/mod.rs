//! Cross-app state sharing.

pub mod store;

pub use store::{default_store, GlobalStateStore, StateCallback, StateHandle, StateMap};

/// Initializes the process-wide store and returns the host's privileged
/// handle.
pub fn init_global_state(initial: impl Into<std::rc::Rc<StateMap>>) -> StateHandle {
    default_store().initialize(initial)
}
