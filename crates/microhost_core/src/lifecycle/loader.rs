//! Lifecycle orchestrator.
//!
//! # Responsibility
//! - Load an app: entry, wrapper, sandbox, `beforeLoad` hooks, scripts and
//!   lifecycle resolution.
//! - Expose reusable mount/unmount step lists the host drives.
//!
//! # Invariants
//! - Bootstrap runs at most once per load, however often the app remounts.
//! - Under singular mode a load or mount waits until the latest mounted
//!   app's unmount steps have all completed.
//! - Hook lists are flattened once per load and never mutated afterwards.
//! - A failing step marks the parcel `Failed` and propagates its error.

use super::deferred::{default_sequencer, Deferred, SingularSequencer};
use super::entry::EntryLoader;
use super::exports::{resolve_lifecycles, LifecycleFn, LifecycleSource, ResolvedLifecycles};
use super::hooks::{exec_hooks_chain, HookStage, LifecycleHooks};
use super::render::{RenderPhase, RenderProps, Renderer};
use super::wrapper::{
    check_legacy_render, create_wrapper_element, default_template_wrapper, wrapper_getter,
    WrapperOptions, WrapperSlot,
};
use crate::addons::{default_add_ons, AddOnProvider};
use crate::config::FrameworkConfig;
use crate::dom::{Document, Element};
use crate::error::LifecycleResult;
use crate::model::app::{AppDescriptor, AppProps, ContainerRef, HostProps, InstanceIdGenerator};
use crate::sandbox::{
    host_global, GlobalContext, OverlaySandboxFactory, Sandbox, SandboxFactory, SandboxRequest,
    WrapperGetter,
};
use crate::state::{default_store, GlobalStateStore, StateHandle};
use futures::future::LocalBoxFuture;
use log::{error, info};
use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::iter;
use std::rc::Rc;

/// One host-driven step.
pub type LifecycleStep = Rc<dyn Fn(HostProps) -> LocalBoxFuture<'static, LifecycleResult<()>>>;

/// Wraps an async closure as a [`LifecycleStep`].
pub fn lifecycle_step<F, Fut>(f: F) -> LifecycleStep
where
    F: Fn(HostProps) -> Fut + 'static,
    Fut: Future<Output = LifecycleResult<()>> + 'static,
{
    Rc::new(move |props: HostProps| -> LocalBoxFuture<'static, LifecycleResult<()>> {
        Box::pin(f(props))
    })
}

/// Runs `steps` in order with a copy of `props` each, stopping at the first
/// error.
pub async fn run_steps(steps: &[LifecycleStep], props: HostProps) -> LifecycleResult<()> {
    for step in steps {
        step(props.clone()).await?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStatus {
    Ready,
    Mounting,
    Mounted,
    Unmounting,
    Unmounted,
    Failed,
}

impl AppStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Mounting => "mounting",
            Self::Mounted => "mounted",
            Self::Unmounting => "unmounting",
            Self::Unmounted => "unmounted",
            Self::Failed => "failed",
        }
    }
}

/// Configuration handed to the host for one mount target.
pub struct ParcelConfig {
    pub name: String,
    pub bootstrap: LifecycleStep,
    pub mount: Vec<LifecycleStep>,
    pub unmount: Vec<LifecycleStep>,
    /// App `update`, passed through without orchestrator steps.
    pub update: Option<LifecycleStep>,
    parcel: Rc<ParcelState>,
}

impl Debug for ParcelConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParcelConfig")
            .field("name", &self.name)
            .field("mount_steps", &self.mount.len())
            .field("unmount_steps", &self.unmount.len())
            .field("update", &self.update.is_some())
            .field("status", &self.status())
            .finish()
    }
}

impl ParcelConfig {
    pub fn status(&self) -> AppStatus {
        self.parcel.status.get()
    }

    /// Wrapper element currently owned by this configuration.
    pub fn wrapper(&self) -> Option<Rc<Element>> {
        self.parcel.wrapper.borrow().clone()
    }

    pub async fn run_bootstrap(&self, props: HostProps) -> LifecycleResult<()> {
        (self.bootstrap)(props).await
    }

    pub async fn run_mount(&self, props: HostProps) -> LifecycleResult<()> {
        run_steps(&self.mount, props).await
    }

    pub async fn run_unmount(&self, props: HostProps) -> LifecycleResult<()> {
        run_steps(&self.unmount, props).await
    }
}

/// Composition root: owns the collaborators every load shares.
pub struct MicroHost {
    document: Rc<Document>,
    entry_loader: Rc<dyn EntryLoader>,
    sandbox_factory: Rc<dyn SandboxFactory>,
    state_store: Rc<GlobalStateStore>,
    sequencer: Rc<SingularSequencer>,
    add_ons: Vec<AddOnProvider>,
    instance_ids: InstanceIdGenerator,
}

impl Debug for MicroHost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicroHost")
            .field("add_ons", &self.add_ons.len())
            .field("state_store", &self.state_store)
            .finish()
    }
}

impl MicroHost {
    /// Creates a runtime using the overlay sandbox, the process-wide state
    /// store and sequencer, and the built-in add-ons.
    pub fn new(document: Rc<Document>, entry_loader: Rc<dyn EntryLoader>) -> Self {
        Self {
            document,
            entry_loader,
            sandbox_factory: Rc::new(OverlaySandboxFactory),
            state_store: default_store(),
            sequencer: default_sequencer(),
            add_ons: default_add_ons(),
            instance_ids: InstanceIdGenerator::new(),
        }
    }

    pub fn with_sandbox_factory(mut self, factory: Rc<dyn SandboxFactory>) -> Self {
        self.sandbox_factory = factory;
        self
    }

    pub fn with_state_store(mut self, store: Rc<GlobalStateStore>) -> Self {
        self.state_store = store;
        self
    }

    pub fn with_sequencer(mut self, sequencer: Rc<SingularSequencer>) -> Self {
        self.sequencer = sequencer;
        self
    }

    pub fn with_add_ons(mut self, add_ons: Vec<AddOnProvider>) -> Self {
        self.add_ons = add_ons;
        self
    }

    pub fn document(&self) -> Rc<Document> {
        self.document.clone()
    }

    pub fn state_store(&self) -> Rc<GlobalStateStore> {
        self.state_store.clone()
    }

    /// Loads `app` and returns a handle producing host configurations.
    pub async fn load_app(
        &self,
        app: AppDescriptor,
        config: &FrameworkConfig,
        hooks: LifecycleHooks,
    ) -> LifecycleResult<LoadedApp> {
        let instance_id = self.instance_ids.next_id(&app.name);
        info!(
            "event=app_load module=lifecycle status=start app={} instance_id={instance_id}",
            app.name
        );
        match self.load_instance(app, &instance_id, config, hooks).await {
            Ok(loaded) => {
                info!(
                    "event=app_load module=lifecycle status=ok instance_id={instance_id} source={:?}",
                    loaded.runtime.lifecycles.source
                );
                Ok(loaded)
            }
            Err(err) => {
                error!(
                    "event=app_load module=lifecycle status=error instance_id={instance_id} code={} error={err}",
                    err.code()
                );
                Err(err)
            }
        }
    }

    async fn load_instance(
        &self,
        app: AppDescriptor,
        instance_id: &str,
        config: &FrameworkConfig,
        hooks: LifecycleHooks,
    ) -> LifecycleResult<LoadedApp> {
        let wrapper_options = WrapperOptions {
            instance_id: instance_id.to_string(),
            strict_style_isolation: config.strict_style_isolation(),
            scoped_css: config.scoped_css(),
            legacy_render: app.render.is_some(),
        };
        check_legacy_render(&wrapper_options)?;

        let entry = self
            .entry_loader
            .load(&app.entry, &config.entry_options)
            .await?;

        if config.is_singular(&app) {
            self.sequencer.wait_for_handoff().await;
        }

        let app_content = default_template_wrapper(instance_id, &app.name, &entry.template);
        let initial_element = create_wrapper_element(&self.document, &app_content, &wrapper_options)?;
        let initial_wrapper: WrapperSlot = Rc::new(RefCell::new(Some(initial_element.clone())));
        let renderer = Renderer::new(self.document.clone(), instance_id, app.render.clone());
        renderer.render(
            &RenderProps {
                element: Some(initial_element),
                loading: true,
                container: app.container.clone(),
            },
            RenderPhase::Loading,
        )?;

        let base_global = config.base_global.clone().unwrap_or_else(host_global);
        let sandbox = if config.sandbox_enabled() {
            Some(self.sandbox_factory.create(SandboxRequest {
                instance_id: instance_id.to_string(),
                wrapper_getter: wrapper_getter(
                    self.document.clone(),
                    wrapper_options.clone(),
                    initial_wrapper.clone(),
                ),
                use_css_scoping: wrapper_options.scoped_css,
                loose: config.loose_sandbox(),
                asset_filter: config.asset_filter.clone(),
                base_global: base_global.clone(),
            })?)
        } else {
            None
        };
        let global = sandbox
            .as_ref()
            .map(|sandbox| sandbox.proxy())
            .unwrap_or(base_global);

        let hooks = LifecycleHooks::flatten(
            self.add_ons
                .iter()
                .map(|provider| provider(&global, entry.asset_public_path.as_str()))
                .chain(iter::once(hooks)),
        );
        exec_hooks_chain(HookStage::BeforeLoad, &hooks.before_load, &app, &global).await?;

        let strict_global = config.sandbox_enabled() && !config.loose_sandbox();
        let exports = entry
            .scripts
            .exec_scripts(global.clone(), strict_global)
            .await?;
        let latest_set_prop = sandbox.as_ref().and_then(|sandbox| sandbox.latest_set_prop());
        let lifecycles =
            resolve_lifecycles(exports.as_ref(), latest_set_prop.as_deref(), &global, &app.name)?;

        let state = self.state_store.handle(instance_id, false);

        Ok(LoadedApp {
            runtime: Rc::new(AppRuntime {
                instance_id: instance_id.to_string(),
                config: config.clone(),
                app,
                document: self.document.clone(),
                sequencer: self.sequencer.clone(),
                renderer,
                app_content,
                wrapper_options,
                initial_wrapper,
                global,
                sandbox,
                hooks,
                lifecycles,
                state,
                bootstrapped: Cell::new(false),
            }),
        })
    }
}

/// State shared by every configuration produced from one load.
struct AppRuntime {
    app: AppDescriptor,
    instance_id: String,
    // Singular mode is decided per step from the descriptor.
    config: FrameworkConfig,
    document: Rc<Document>,
    sequencer: Rc<SingularSequencer>,
    renderer: Renderer,
    app_content: String,
    wrapper_options: WrapperOptions,
    initial_wrapper: WrapperSlot,
    global: GlobalContext,
    sandbox: Option<Rc<dyn Sandbox>>,
    hooks: LifecycleHooks,
    lifecycles: ResolvedLifecycles,
    state: StateHandle,
    bootstrapped: Cell<bool>,
}

impl AppRuntime {
    fn is_singular(&self) -> bool {
        self.config.is_singular(&self.app)
    }

    fn props(&self, custom: HostProps, container: Option<Rc<Element>>) -> AppProps {
        AppProps {
            name: self.app.name.clone(),
            custom,
            container,
            global_state: Some(self.state.clone()),
        }
    }

    async fn run_hooks(&self, stage: HookStage) -> LifecycleResult<()> {
        exec_hooks_chain(stage, self.hooks.stage(stage), &self.app, &self.global).await
    }
}

/// Per-configuration mutable state.
struct ParcelState {
    instance_id: String,
    container: Option<ContainerRef>,
    wrapper: WrapperSlot,
    getter: WrapperGetter,
    status: Cell<AppStatus>,
    unmounted: RefCell<Option<Rc<Deferred>>>,
}

/// A loaded app. Produces host configurations; scripts never re-run.
#[derive(Clone)]
pub struct LoadedApp {
    runtime: Rc<AppRuntime>,
}

impl Debug for LoadedApp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedApp")
            .field("instance_id", &self.runtime.instance_id)
            .field("bootstrapped", &self.runtime.bootstrapped.get())
            .finish()
    }
}

impl LoadedApp {
    pub fn name(&self) -> &str {
        &self.runtime.app.name
    }

    pub fn instance_id(&self) -> &str {
        &self.runtime.instance_id
    }

    /// Global context app code runs against.
    pub fn global(&self) -> GlobalContext {
        self.runtime.global.clone()
    }

    pub fn sandbox(&self) -> Option<Rc<dyn Sandbox>> {
        self.runtime.sandbox.clone()
    }

    pub fn lifecycle_source(&self) -> LifecycleSource {
        self.runtime.lifecycles.source
    }

    /// Wrapper element most recently built for this load.
    pub fn wrapper(&self) -> Option<Rc<Element>> {
        self.runtime.initial_wrapper.borrow().clone()
    }

    pub fn state_handle(&self) -> StateHandle {
        self.runtime.state.clone()
    }

    /// Builds a host configuration targeting `remount_container`, or the
    /// descriptor's container when `None`.
    pub fn parcel_config(&self, remount_container: Option<ContainerRef>) -> ParcelConfig {
        let runtime = self.runtime.clone();
        let wrapper: WrapperSlot = Rc::new(RefCell::new(None));
        let parcel = Rc::new(ParcelState {
            instance_id: runtime.instance_id.clone(),
            container: remount_container.or_else(|| runtime.app.container.clone()),
            getter: wrapper_getter(
                runtime.document.clone(),
                runtime.wrapper_options.clone(),
                wrapper.clone(),
            ),
            wrapper,
            status: Cell::new(AppStatus::Ready),
            unmounted: RefCell::new(None),
        });

        let mount = vec![
            singular_wait_step(&runtime, &parcel),
            wrapper_init_step(&runtime, &parcel),
            mount_render_step(&runtime, &parcel),
            sandbox_step(&runtime, &parcel, true),
            hook_step(&runtime, &parcel, HookStage::BeforeMount),
            app_mount_step(&runtime, &parcel),
            mounted_render_step(&runtime, &parcel),
            hook_step(&runtime, &parcel, HookStage::AfterMount),
            arm_singular_step(&runtime, &parcel),
        ];
        let unmount = vec![
            hook_step(&runtime, &parcel, HookStage::BeforeUnmount),
            app_unmount_step(&runtime, &parcel),
            sandbox_step(&runtime, &parcel, false),
            hook_step(&runtime, &parcel, HookStage::AfterUnmount),
            teardown_step(&runtime, &parcel),
            release_singular_step(&runtime, &parcel),
        ];

        ParcelConfig {
            name: runtime.instance_id.clone(),
            bootstrap: bootstrap_step(&runtime),
            update: runtime.lifecycles.update.clone().map(|update| passthrough(&runtime, update)),
            mount,
            unmount,
            parcel,
        }
    }
}

/// Wraps a step so a failure marks the parcel as failed.
fn guarded<F, Fut>(parcel: &Rc<ParcelState>, f: F) -> LifecycleStep
where
    F: Fn(HostProps) -> Fut + 'static,
    Fut: Future<Output = LifecycleResult<()>> + 'static,
{
    let parcel = parcel.clone();
    lifecycle_step(move |props| {
        let fut = f(props);
        let parcel = parcel.clone();
        async move {
            let result = fut.await;
            if let Err(err) = &result {
                parcel.status.set(AppStatus::Failed);
                error!(
                    "event=app_step module=lifecycle status=error instance_id={} code={} error={err}",
                    parcel.instance_id,
                    err.code()
                );
            }
            result
        }
    })
}

fn bootstrap_step(runtime: &Rc<AppRuntime>) -> LifecycleStep {
    let runtime = runtime.clone();
    lifecycle_step(move |props| {
        let runtime = runtime.clone();
        async move {
            if runtime.bootstrapped.get() {
                return Ok(());
            }
            if let Some(bootstrap) = &runtime.lifecycles.bootstrap {
                bootstrap(runtime.props(props, None)).await?;
            }
            runtime.bootstrapped.set(true);
            info!(
                "event=app_bootstrap module=lifecycle status=ok instance_id={}",
                runtime.instance_id
            );
            Ok(())
        }
    })
}

fn passthrough(runtime: &Rc<AppRuntime>, update: LifecycleFn) -> LifecycleStep {
    let name = runtime.app.name.clone();
    lifecycle_step(move |props| {
        update(AppProps {
            name: name.clone(),
            custom: props,
            ..AppProps::default()
        })
    })
}

fn singular_wait_step(runtime: &Rc<AppRuntime>, parcel: &Rc<ParcelState>) -> LifecycleStep {
    let (runtime, state) = (runtime.clone(), parcel.clone());
    guarded(parcel, move |_| {
        let (runtime, state) = (runtime.clone(), state.clone());
        async move {
            state.status.set(AppStatus::Mounting);
            if runtime.is_singular() {
                runtime.sequencer.wait_for_handoff().await;
            }
            Ok(())
        }
    })
}

fn wrapper_init_step(runtime: &Rc<AppRuntime>, parcel: &Rc<ParcelState>) -> LifecycleStep {
    let (runtime, state) = (runtime.clone(), parcel.clone());
    guarded(parcel, move |_| {
        let current = runtime.initial_wrapper.borrow().clone();
        *state.wrapper.borrow_mut() = current;
        async { Ok(()) }
    })
}

fn mount_render_step(runtime: &Rc<AppRuntime>, parcel: &Rc<ParcelState>) -> LifecycleStep {
    let (runtime, state) = (runtime.clone(), parcel.clone());
    guarded(parcel, move |_| {
        let result = remount_and_render(&runtime, &state);
        async move { result }
    })
}

fn remount_and_render(runtime: &AppRuntime, parcel: &ParcelState) -> LifecycleResult<()> {
    let use_new_container = parcel.container != runtime.app.container;
    if use_new_container || parcel.wrapper.borrow().is_none() {
        let element =
            create_wrapper_element(&runtime.document, &runtime.app_content, &runtime.wrapper_options)?;
        *parcel.wrapper.borrow_mut() = Some(element.clone());
        *runtime.initial_wrapper.borrow_mut() = Some(element);
    }
    let element = parcel.wrapper.borrow().clone();
    runtime.renderer.render(
        &RenderProps {
            element,
            loading: true,
            container: parcel.container.clone(),
        },
        RenderPhase::Mounting,
    )
}

fn sandbox_step(runtime: &Rc<AppRuntime>, parcel: &Rc<ParcelState>, mount: bool) -> LifecycleStep {
    let runtime = runtime.clone();
    guarded(parcel, move |_| {
        let sandbox = runtime.sandbox.clone();
        async move {
            match sandbox {
                Some(sandbox) if mount => sandbox.mount().await,
                Some(sandbox) => sandbox.unmount().await,
                None => Ok(()),
            }
        }
    })
}

fn hook_step(runtime: &Rc<AppRuntime>, parcel: &Rc<ParcelState>, stage: HookStage) -> LifecycleStep {
    let (runtime, state) = (runtime.clone(), parcel.clone());
    guarded(parcel, move |_| {
        let (runtime, state) = (runtime.clone(), state.clone());
        async move {
            if stage == HookStage::BeforeUnmount {
                state.status.set(AppStatus::Unmounting);
            }
            runtime.run_hooks(stage).await
        }
    })
}

fn app_mount_step(runtime: &Rc<AppRuntime>, parcel: &Rc<ParcelState>) -> LifecycleStep {
    let (runtime, state) = (runtime.clone(), parcel.clone());
    guarded(parcel, move |props| {
        let prepared = (state.getter)().map(|container| {
            (
                runtime.lifecycles.mount.clone(),
                runtime.props(props, Some(container)),
            )
        });
        async move {
            let (mount, props) = prepared?;
            mount(props).await
        }
    })
}

fn mounted_render_step(runtime: &Rc<AppRuntime>, parcel: &Rc<ParcelState>) -> LifecycleStep {
    let (runtime, state) = (runtime.clone(), parcel.clone());
    guarded(parcel, move |_| {
        let result = runtime.renderer.render(
            &RenderProps {
                element: state.wrapper.borrow().clone(),
                loading: false,
                container: state.container.clone(),
            },
            RenderPhase::Mounted,
        );
        async move { result }
    })
}

fn arm_singular_step(runtime: &Rc<AppRuntime>, parcel: &Rc<ParcelState>) -> LifecycleStep {
    let (runtime, state) = (runtime.clone(), parcel.clone());
    guarded(parcel, move |_| {
        if runtime.is_singular() {
            *state.unmounted.borrow_mut() = Some(runtime.sequencer.arm());
        }
        state.status.set(AppStatus::Mounted);
        info!(
            "event=app_mount module=lifecycle status=ok instance_id={}",
            runtime.instance_id
        );
        async { Ok(()) }
    })
}

fn app_unmount_step(runtime: &Rc<AppRuntime>, parcel: &Rc<ParcelState>) -> LifecycleStep {
    let (runtime, state) = (runtime.clone(), parcel.clone());
    guarded(parcel, move |props| {
        let prepared = (state.getter)().map(|container| {
            (
                runtime.lifecycles.unmount.clone(),
                runtime.props(props, Some(container)),
            )
        });
        async move {
            let (unmount, props) = prepared?;
            unmount(props).await
        }
    })
}

fn teardown_step(runtime: &Rc<AppRuntime>, parcel: &Rc<ParcelState>) -> LifecycleStep {
    let (runtime, state) = (runtime.clone(), parcel.clone());
    guarded(parcel, move |_| {
        let result = runtime.renderer.render(
            &RenderProps {
                element: None,
                loading: false,
                container: state.container.clone(),
            },
            RenderPhase::Unmounted,
        );
        runtime.state.unsubscribe();
        state.wrapper.borrow_mut().take();
        runtime.initial_wrapper.borrow_mut().take();
        async move { result }
    })
}

fn release_singular_step(runtime: &Rc<AppRuntime>, parcel: &Rc<ParcelState>) -> LifecycleStep {
    let (runtime, state) = (runtime.clone(), parcel.clone());
    guarded(parcel, move |_| {
        if let Some(deferred) = state.unmounted.borrow_mut().take() {
            deferred.resolve();
        }
        state.status.set(AppStatus::Unmounted);
        info!(
            "event=app_unmount module=lifecycle status=ok instance_id={}",
            runtime.instance_id
        );
        async { Ok(()) }
    })
}

#[cfg(test)]
mod tests {
    use super::{lifecycle_step, run_steps, AppStatus};
    use crate::error::LifecycleError;
    use futures::executor::block_on;
    use serde_json::Map;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn run_steps_stops_at_first_error() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = {
            let log = log.clone();
            lifecycle_step(move |_| {
                log.borrow_mut().push("first");
                async { Ok(()) }
            })
        };
        let failing = lifecycle_step(|_| async { Err(LifecycleError::app("mount", "boom")) });
        let never = {
            let log = log.clone();
            lifecycle_step(move |_| {
                log.borrow_mut().push("never");
                async { Ok(()) }
            })
        };

        let err = block_on(run_steps(&[first, failing, never], Map::new()))
            .expect_err("second step fails");
        assert_eq!(err, LifecycleError::app("mount", "boom"));
        assert_eq!(*log.borrow(), vec!["first"]);
    }

    #[test]
    fn status_names_are_stable() {
        assert_eq!(AppStatus::Unmounting.as_str(), "unmounting");
        assert_eq!(AppStatus::Failed.as_str(), "failed");
    }
}
