//! Built-in hook providers.
//!
//! # Responsibility
//! - Contribute hooks that run before the host's own hooks of each stage.
//!
//! # Invariants
//! - Providers are invoked once per load with the instance's global context
//!   and asset public path; their hooks are concatenated, never replacing
//!   host hooks.

pub mod engine_flag;
pub mod public_path;

use crate::lifecycle::hooks::LifecycleHooks;
use crate::sandbox::GlobalContext;
use std::rc::Rc;

/// Builds hook lists for one load from `(global, asset_public_path)`.
pub type AddOnProvider = Rc<dyn Fn(&GlobalContext, &str) -> LifecycleHooks>;

/// Providers installed on every runtime unless replaced.
pub fn default_add_ons() -> Vec<AddOnProvider> {
    let flag: AddOnProvider = Rc::new(|global: &GlobalContext, _: &str| engine_flag::hooks(global));
    let path: AddOnProvider =
        Rc::new(|global: &GlobalContext, path: &str| public_path::hooks(global, path));
    vec![flag, path]
}
