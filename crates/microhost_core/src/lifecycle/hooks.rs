//! Lifecycle hook lists and their sequential executor.
//!
//! # Invariants
//! - Hooks of one chain run strictly in list order; each starts only after
//!   the previous one completed.
//! - The first failing hook aborts the chain.

use crate::error::{LifecycleError, LifecycleResult};
use crate::model::app::AppDescriptor;
use crate::sandbox::GlobalContext;
use futures::future::LocalBoxFuture;
use log::debug;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    BeforeLoad,
    BeforeMount,
    AfterMount,
    BeforeUnmount,
    AfterUnmount,
}

impl HookStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeLoad => "beforeLoad",
            Self::BeforeMount => "beforeMount",
            Self::AfterMount => "afterMount",
            Self::BeforeUnmount => "beforeUnmount",
            Self::AfterUnmount => "afterUnmount",
        }
    }
}

/// One hook invoked with the app descriptor and its global context.
pub type LifecycleHook =
    Rc<dyn Fn(&AppDescriptor, &GlobalContext) -> LocalBoxFuture<'static, LifecycleResult<()>>>;

/// Wraps an async closure as a [`LifecycleHook`].
pub fn hook<F, Fut>(f: F) -> LifecycleHook
where
    F: Fn(&AppDescriptor, &GlobalContext) -> Fut + 'static,
    Fut: Future<Output = LifecycleResult<()>> + 'static,
{
    Rc::new(
        move |app: &AppDescriptor, global: &GlobalContext| -> LocalBoxFuture<'static, LifecycleResult<()>> {
            Box::pin(f(app, global))
        },
    )
}

/// Hook lists per stage. Lists from several contributors are concatenated,
/// never replaced.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    pub before_load: Vec<LifecycleHook>,
    pub before_mount: Vec<LifecycleHook>,
    pub after_mount: Vec<LifecycleHook>,
    pub before_unmount: Vec<LifecycleHook>,
    pub after_unmount: Vec<LifecycleHook>,
}

impl Debug for LifecycleHooks {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("before_load", &self.before_load.len())
            .field("before_mount", &self.before_mount.len())
            .field("after_mount", &self.after_mount.len())
            .field("before_unmount", &self.before_unmount.len())
            .field("after_unmount", &self.after_unmount.len())
            .finish()
    }
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one hook to `stage`.
    pub fn with(mut self, stage: HookStage, hook: LifecycleHook) -> Self {
        self.stage_mut(stage).push(hook);
        self
    }

    pub fn stage(&self, stage: HookStage) -> &[LifecycleHook] {
        match stage {
            HookStage::BeforeLoad => &self.before_load,
            HookStage::BeforeMount => &self.before_mount,
            HookStage::AfterMount => &self.after_mount,
            HookStage::BeforeUnmount => &self.before_unmount,
            HookStage::AfterUnmount => &self.after_unmount,
        }
    }

    fn stage_mut(&mut self, stage: HookStage) -> &mut Vec<LifecycleHook> {
        match stage {
            HookStage::BeforeLoad => &mut self.before_load,
            HookStage::BeforeMount => &mut self.before_mount,
            HookStage::AfterMount => &mut self.after_mount,
            HookStage::BeforeUnmount => &mut self.before_unmount,
            HookStage::AfterUnmount => &mut self.after_unmount,
        }
    }

    /// Returns `self` followed by `other`, stage by stage.
    pub fn concat(mut self, other: LifecycleHooks) -> Self {
        self.before_load.extend(other.before_load);
        self.before_mount.extend(other.before_mount);
        self.after_mount.extend(other.after_mount);
        self.before_unmount.extend(other.before_unmount);
        self.after_unmount.extend(other.after_unmount);
        self
    }

    /// Flattens contributor lists in order.
    pub fn flatten(lists: impl IntoIterator<Item = LifecycleHooks>) -> Self {
        lists
            .into_iter()
            .fold(Self::default(), |acc, hooks| acc.concat(hooks))
    }
}

/// Runs `hooks` one after another against `(app, global)`.
pub async fn exec_hooks_chain(
    stage: HookStage,
    hooks: &[LifecycleHook],
    app: &AppDescriptor,
    global: &GlobalContext,
) -> LifecycleResult<()> {
    for (index, hook) in hooks.iter().enumerate() {
        debug!(
            "event=hook_run module=lifecycle status=start stage={} app={} index={index}",
            stage.as_str(),
            app.name
        );
        hook(app, global).await.map_err(|err| match err {
            LifecycleError::Hook { .. } => err,
            other => LifecycleError::Hook {
                stage,
                message: other.to_string(),
            },
        })?;
    }
    Ok(())
}
