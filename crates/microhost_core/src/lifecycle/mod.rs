//! App lifecycle orchestration.
//!
//! # Responsibility
//! - Drive an app through load, mount and unmount in a fixed step order.
//! - Sequence hook chains and the singular-mode hand-off.
//!
//! # Invariants
//! - Every step runs on one thread; steps only interleave at await points.
//!
//! # See also
//! - `loader` for the step lists themselves.

pub mod deferred;
pub mod entry;
pub mod exports;
pub mod hooks;
pub mod loader;
pub mod render;
pub mod wrapper;

pub use deferred::{default_sequencer, Deferred, SingularSequencer};
pub use entry::{EntryLoader, LoadedEntry, ScriptExecutor, ScriptFn};
pub use exports::{lifecycle_fn, AppLifecycles, LifecycleFn, LifecycleSource};
pub use hooks::{exec_hooks_chain, hook, HookStage, LifecycleHook, LifecycleHooks};
pub use loader::{
    lifecycle_step, run_steps, AppStatus, LifecycleStep, LoadedApp, MicroHost, ParcelConfig,
};
pub use render::{RenderPhase, RenderProps, Renderer};
pub use wrapper::{default_template_wrapper, wrapper_id};
