//! Sandbox capability consumed by the orchestrator.
//!
//! # Responsibility
//! - Describe the per-instance global context an app runs against.
//! - Provide the overlay implementation used when the host injects none.
//!
//! # Invariants
//! - A sandbox's proxy is owned by exactly one app instance.
//! - `mount`/`unmount` swap the instance's global writes in and out.

pub mod global;
pub mod overlay;

use crate::dom::Element;
use crate::error::LifecycleResult;
use async_trait::async_trait;
use std::rc::Rc;

pub use global::{host_global, GlobalContext, GlobalEnv, GlobalScope, GlobalValue};
pub use overlay::{OverlaySandbox, OverlaySandboxFactory};

/// Resolves the element an instance currently renders into.
pub type WrapperGetter = Rc<dyn Fn() -> LifecycleResult<Rc<Element>>>;

/// Returns `true` for asset URLs the sandbox must not intercept.
pub type AssetFilter = Rc<dyn Fn(&str) -> bool>;

/// Parameters for creating one instance's sandbox.
#[derive(Clone)]
pub struct SandboxRequest {
    pub instance_id: String,
    pub wrapper_getter: WrapperGetter,
    pub use_css_scoping: bool,
    pub loose: bool,
    pub asset_filter: Option<AssetFilter>,
    pub base_global: GlobalContext,
}

/// Isolated global context for one app instance.
#[async_trait(?Send)]
pub trait Sandbox {
    /// Global context that replaces the host default for this instance.
    fn proxy(&self) -> GlobalContext;
    /// Most recently assigned global key, if any.
    fn latest_set_prop(&self) -> Option<String>;
    async fn mount(&self) -> LifecycleResult<()>;
    async fn unmount(&self) -> LifecycleResult<()>;
}

/// Creates sandboxes for app instances.
pub trait SandboxFactory {
    fn create(&self, request: SandboxRequest) -> LifecycleResult<Rc<dyn Sandbox>>;
}
