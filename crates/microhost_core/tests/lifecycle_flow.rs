use async_trait::async_trait;
use futures::executor::{block_on, LocalPool};
use futures::task::LocalSpawnExt;
use microhost_core::addons::engine_flag::ENGINE_FLAG;
use microhost_core::addons::public_path::PUBLIC_PATH_KEY;
use microhost_core::dom::{parse_fragment, Node};
use microhost_core::lifecycle::{
    hook, lifecycle_fn, wrapper_id, HookStage, LifecycleSource, RenderPhase, ScriptFn,
    SingularSequencer,
};
use microhost_core::model::app::LegacyRenderProps;
use microhost_core::state::StateMap;
use microhost_core::{
    AppDescriptor, AppEntry, AppLifecycles, AppProps, AppStatus, ContainerRef, Document, Element,
    EntryLoader, FrameworkConfig, GlobalContext, GlobalEnv, GlobalScope, GlobalStateStore,
    GlobalValue, LifecycleError, LifecycleHooks, LifecycleResult, LoadedEntry, MicroHost,
    SandboxOption, SandboxOptions, ScriptExecutor,
};
use serde_json::{json, Map, Value};
use std::cell::RefCell;
use std::rc::Rc;

struct InlineLoader {
    scripts: Rc<dyn ScriptExecutor>,
}

#[async_trait(?Send)]
impl EntryLoader for InlineLoader {
    async fn load(
        &self,
        entry: &AppEntry,
        _options: &Map<String, Value>,
    ) -> LifecycleResult<LoadedEntry> {
        let template = match entry {
            AppEntry::Inline(inline) => inline.html.clone(),
            AppEntry::Url(url) => return Err(LifecycleError::Entry(format!("unreachable {url}"))),
        };
        Ok(LoadedEntry {
            template,
            asset_public_path: "/assets/".to_string(),
            scripts: self.scripts.clone(),
        })
    }
}

#[derive(Default)]
struct Recorder {
    events: RefCell<Vec<String>>,
    containers: RefCell<Vec<Rc<Element>>>,
    custom: RefCell<Vec<Map<String, Value>>>,
}

impl Recorder {
    fn push(&self, event: String) {
        self.events.borrow_mut().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    fn count(&self, suffix: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.ends_with(suffix))
            .count()
    }
}

fn recording_lifecycles(recorder: &Rc<Recorder>) -> AppLifecycles {
    let step = |stage: &'static str| {
        let recorder = recorder.clone();
        lifecycle_fn(move |props: AppProps| {
            recorder.push(format!("{}:{stage}", props.name));
            if let Some(container) = &props.container {
                recorder.containers.borrow_mut().push(container.clone());
            }
            recorder.custom.borrow_mut().push(props.custom.clone());
            async { Ok(()) }
        })
    };
    AppLifecycles::new(step("mount"), step("unmount"))
        .with_bootstrap(step("bootstrap"))
        .with_update(step("update"))
}

fn recording_hooks(recorder: &Rc<Recorder>) -> LifecycleHooks {
    [
        HookStage::BeforeLoad,
        HookStage::BeforeMount,
        HookStage::AfterMount,
        HookStage::BeforeUnmount,
        HookStage::AfterUnmount,
    ]
    .into_iter()
    .fold(LifecycleHooks::new(), |hooks, stage| {
        let recorder = recorder.clone();
        hooks.with(
            stage,
            hook(move |app: &AppDescriptor, _global: &GlobalContext| {
                recorder.push(format!("{}:{}", app.name, stage.as_str()));
                async { Ok(()) }
            }),
        )
    })
}

fn exporting(lifecycles: AppLifecycles) -> Rc<dyn ScriptExecutor> {
    ScriptFn::new(move |_global, _strict| Ok(Some(lifecycles.clone())))
}

fn page() -> (Rc<Document>, Rc<Element>) {
    let document = Rc::new(Document::new());
    let root = Element::new("div");
    root.set_attribute("id", "subapp");
    document.body().append_child(root.clone());
    (document, root)
}

fn host(document: &Rc<Document>, scripts: Rc<dyn ScriptExecutor>) -> MicroHost {
    MicroHost::new(document.clone(), Rc::new(InlineLoader { scripts }))
        .with_state_store(GlobalStateStore::new())
        .with_sequencer(SingularSequencer::new())
}

fn isolated_config() -> FrameworkConfig {
    FrameworkConfig::default().with_base_global(GlobalEnv::new())
}

fn orders() -> AppDescriptor {
    AppDescriptor::inline("orders", "<section>orders</section>").with_container("#subapp")
}

#[test]
fn full_cycle_runs_hooks_and_lifecycles_in_order() {
    let (document, root) = page();
    let recorder = Rc::new(Recorder::default());
    let host = host(&document, exporting(recording_lifecycles(&recorder)));

    let loaded = block_on(host.load_app(orders(), &isolated_config(), recording_hooks(&recorder)))
        .expect("load");
    assert_eq!(loaded.instance_id(), "orders");
    assert_eq!(loaded.lifecycle_source(), LifecycleSource::Exports);
    assert_eq!(recorder.events(), vec!["orders:beforeLoad"]);
    let wrapper = root.first_element_child().expect("loading render");
    assert_eq!(wrapper.id(), Some(wrapper_id("orders")));

    let parcel = loaded.parcel_config(None);
    assert_eq!(parcel.status(), AppStatus::Ready);
    block_on(parcel.run_bootstrap(Map::new())).expect("bootstrap");
    block_on(parcel.run_mount(Map::new())).expect("mount");
    assert_eq!(parcel.status(), AppStatus::Mounted);
    assert_eq!(
        recorder.containers.borrow()[0].id(),
        Some(wrapper_id("orders"))
    );

    block_on(parcel.run_unmount(Map::new())).expect("unmount");
    assert_eq!(parcel.status(), AppStatus::Unmounted);
    assert_eq!(root.child_count(), 0);
    assert!(parcel.wrapper().is_none());
    assert!(loaded.wrapper().is_none());

    assert_eq!(
        recorder.events(),
        vec![
            "orders:beforeLoad",
            "orders:bootstrap",
            "orders:beforeMount",
            "orders:mount",
            "orders:afterMount",
            "orders:beforeUnmount",
            "orders:unmount",
            "orders:afterUnmount",
        ]
    );
}

#[test]
fn mount_keeps_the_loading_render_in_place() {
    let (document, root) = page();
    let recorder = Rc::new(Recorder::default());
    let host = host(&document, exporting(recording_lifecycles(&recorder)));

    let loaded = block_on(host.load_app(orders(), &isolated_config(), LifecycleHooks::new()))
        .expect("load");
    let mutations = root.mutation_count();

    let parcel = loaded.parcel_config(None);
    block_on(parcel.run_mount(Map::new())).expect("mount");
    assert_eq!(root.mutation_count(), mutations);
    assert_eq!(root.child_count(), 1);
}

#[test]
fn remount_into_new_container_builds_fresh_wrapper_and_bootstraps_once() {
    let (document, root) = page();
    let other = Element::new("div");
    other.set_attribute("id", "other");
    document.body().append_child(other.clone());
    let recorder = Rc::new(Recorder::default());
    let host = host(&document, exporting(recording_lifecycles(&recorder)));

    let loaded = block_on(host.load_app(orders(), &isolated_config(), LifecycleHooks::new()))
        .expect("load");
    let first = loaded.parcel_config(None);
    block_on(first.run_bootstrap(Map::new())).expect("bootstrap");
    block_on(first.run_mount(Map::new())).expect("mount");
    let first_wrapper = first.wrapper().expect("mounted wrapper");
    block_on(first.run_unmount(Map::new())).expect("unmount");

    let second = loaded.parcel_config(Some(ContainerRef::from("#other")));
    block_on(second.run_bootstrap(Map::new())).expect("bootstrap again");
    block_on(second.run_mount(Map::new())).expect("remount");

    let second_wrapper = second.wrapper().expect("remounted wrapper");
    assert!(!Rc::ptr_eq(&first_wrapper, &second_wrapper));
    assert!(other.contains(&second_wrapper));
    assert_eq!(root.child_count(), 0);
    assert_eq!(recorder.count(":bootstrap"), 1);
    assert_eq!(recorder.count(":mount"), 2);
}

#[test]
fn same_app_loaded_twice_gets_distinct_instance_ids() {
    let (document, _root) = page();
    let recorder = Rc::new(Recorder::default());
    let host = host(&document, exporting(recording_lifecycles(&recorder)));
    let config = isolated_config();

    let first = block_on(host.load_app(orders(), &config, LifecycleHooks::new())).expect("first");
    let second =
        block_on(host.load_app(orders(), &config, LifecycleHooks::new())).expect("second");
    assert_eq!(first.instance_id(), "orders");
    assert_eq!(second.instance_id(), "orders_1");
    assert_eq!(second.name(), "orders");
}

#[test]
fn lifecycles_fall_back_to_latest_global_assignment() {
    let (document, _root) = page();
    let recorder = Rc::new(Recorder::default());
    let lifecycles = recording_lifecycles(&recorder);
    let scripts = ScriptFn::new(move |global, _strict| {
        global.set("vendorBundle", GlobalValue::Lifecycles(lifecycles.clone()));
        Ok(None)
    });
    let host = host(&document, scripts);

    let loaded = block_on(host.load_app(orders(), &isolated_config(), LifecycleHooks::new()))
        .expect("load");
    assert_eq!(loaded.lifecycle_source(), LifecycleSource::LatestSetProp);
}

#[test]
fn lifecycles_fall_back_to_global_named_after_app() {
    let (document, _root) = page();
    let recorder = Rc::new(Recorder::default());
    let lifecycles = recording_lifecycles(&recorder);
    let scripts = ScriptFn::new(move |global, _strict| {
        global.set("orders", GlobalValue::Lifecycles(lifecycles.clone()));
        global.set("buildHash", GlobalValue::data("abc123"));
        Ok(None)
    });
    let host = host(&document, scripts);

    let loaded = block_on(host.load_app(orders(), &isolated_config(), LifecycleHooks::new()))
        .expect("load");
    assert_eq!(loaded.lifecycle_source(), LifecycleSource::GlobalName);
}

#[test]
fn missing_lifecycles_fail_the_load() {
    let (document, _root) = page();
    let mount_only = AppLifecycles {
        mount: Some(lifecycle_fn(|_props: AppProps| async { Ok(()) })),
        ..AppLifecycles::default()
    };
    let host = host(&document, exporting(mount_only));

    let err = block_on(host.load_app(orders(), &isolated_config(), LifecycleHooks::new()))
        .expect_err("unmount is required");
    assert_eq!(
        err,
        LifecycleError::MissingLifecycles {
            app: "orders".to_string()
        }
    );
}

#[test]
fn singular_mode_waits_for_previous_unmount() {
    let (document, _root) = page();
    let recorder = Rc::new(Recorder::default());
    let host = Rc::new(host(&document, exporting(recording_lifecycles(&recorder))));
    let config = isolated_config().with_singular(true);

    let first = block_on(host.load_app(
        AppDescriptor::inline("a", "<p>a</p>").with_container("#subapp"),
        &config,
        LifecycleHooks::new(),
    ))
    .expect("load a");
    let first = first.parcel_config(None);
    block_on(first.run_mount(Map::new())).expect("mount a");

    let mut pool = LocalPool::new();
    {
        let (host, config, recorder) = (host.clone(), config.clone(), recorder.clone());
        pool.spawner()
            .spawn_local(async move {
                let loaded = host
                    .load_app(
                        AppDescriptor::inline("b", "<p>b</p>").with_container("#subapp"),
                        &config,
                        LifecycleHooks::new(),
                    )
                    .await
                    .expect("load b");
                let parcel = loaded.parcel_config(None);
                parcel.run_mount(Map::new()).await.expect("mount b");
                recorder.push("b:done".to_string());
            })
            .expect("spawn");
    }

    pool.run_until_stalled();
    assert_eq!(recorder.events(), vec!["a:mount"]);

    block_on(first.run_unmount(Map::new())).expect("unmount a");
    pool.run_until_stalled();
    assert_eq!(
        recorder.events(),
        vec!["a:mount", "a:unmount", "b:mount", "b:done"]
    );
}

#[test]
fn strict_isolation_mounts_into_shadow_root() {
    let (document, _root) = page();
    let recorder = Rc::new(Recorder::default());
    let host = host(&document, exporting(recording_lifecycles(&recorder)));
    let config = isolated_config().with_sandbox(SandboxOption::Options(SandboxOptions {
        strict_style_isolation: true,
        ..SandboxOptions::default()
    }));

    let loaded =
        block_on(host.load_app(orders(), &config, LifecycleHooks::new())).expect("load");
    block_on(loaded.parcel_config(None).run_mount(Map::new())).expect("mount");

    let container = recorder.containers.borrow()[0].clone();
    assert!(container.is_shadow_root());
    assert_eq!(container.text_content(), "orders");
}

#[test]
fn strict_isolation_degrades_without_shadow_support() {
    let document = Rc::new(Document::without_shadow_dom());
    let root = Element::new("div");
    root.set_attribute("id", "subapp");
    document.body().append_child(root);
    let recorder = Rc::new(Recorder::default());
    let host = host(&document, exporting(recording_lifecycles(&recorder)));
    let config = isolated_config().with_sandbox(SandboxOption::Options(SandboxOptions {
        strict_style_isolation: true,
        ..SandboxOptions::default()
    }));

    let loaded =
        block_on(host.load_app(orders(), &config, LifecycleHooks::new())).expect("load");
    block_on(loaded.parcel_config(None).run_mount(Map::new())).expect("mount");

    let container = recorder.containers.borrow()[0].clone();
    assert!(!container.is_shadow_root());
    assert_eq!(container.id(), Some(wrapper_id("orders")));
}

#[test]
fn legacy_render_receives_markup_and_rejects_isolation() {
    let (document, root) = page();
    let recorder = Rc::new(Recorder::default());
    let host = host(&document, exporting(recording_lifecycles(&recorder)));
    let loading_flags = Rc::new(RefCell::new(Vec::new()));

    let app = {
        let (root, loading_flags) = (root.clone(), loading_flags.clone());
        AppDescriptor::inline("orders", "<section>orders</section>").with_render(
            move |props: LegacyRenderProps| {
                loading_flags.borrow_mut().push(props.loading);
                root.remove_all_children();
                for node in parse_fragment(&props.markup).expect("wrapper markup") {
                    if let Node::Element(element) = node {
                        root.append_child(element);
                    }
                }
            },
        )
    };

    let loaded = block_on(host.load_app(app.clone(), &isolated_config(), LifecycleHooks::new()))
        .expect("load");
    let parcel = loaded.parcel_config(None);
    block_on(parcel.run_mount(Map::new())).expect("mount");
    block_on(parcel.run_unmount(Map::new())).expect("unmount");
    assert_eq!(*loading_flags.borrow(), vec![true, true, false, false]);
    assert_eq!(root.child_count(), 0);

    let strict = isolated_config().with_sandbox(SandboxOption::Options(SandboxOptions {
        strict_style_isolation: true,
        ..SandboxOptions::default()
    }));
    let err = block_on(host.load_app(app, &strict, LifecycleHooks::new()))
        .expect_err("legacy render cannot isolate");
    assert_eq!(
        err,
        LifecycleError::LegacyRenderConflict {
            option: "strict_style_isolation"
        }
    );
}

#[test]
fn missing_container_fails_and_marks_parcel_failed() {
    let (document, _root) = page();
    let recorder = Rc::new(Recorder::default());
    let host = host(&document, exporting(recording_lifecycles(&recorder)));

    let err = block_on(host.load_app(
        AppDescriptor::inline("orders", "<p></p>").with_container("#nowhere"),
        &isolated_config(),
        LifecycleHooks::new(),
    ))
    .expect_err("loading render needs a container");
    assert!(matches!(
        err,
        LifecycleError::ContainerNotFound {
            phase: RenderPhase::Loading,
            ..
        }
    ));

    let loaded = block_on(host.load_app(orders(), &isolated_config(), LifecycleHooks::new()))
        .expect("load");
    let parcel = loaded.parcel_config(Some(ContainerRef::from("#gone")));
    let err = block_on(parcel.run_mount(Map::new())).expect_err("mount target missing");
    assert!(matches!(
        err,
        LifecycleError::ContainerNotFound {
            phase: RenderPhase::Mounting,
            ..
        }
    ));
    assert_eq!(parcel.status(), AppStatus::Failed);
    assert_eq!(recorder.count(":mount"), 0);
}

#[test]
fn failing_hook_aborts_mount() {
    let (document, _root) = page();
    let recorder = Rc::new(Recorder::default());
    let host = host(&document, exporting(recording_lifecycles(&recorder)));
    let hooks = LifecycleHooks::new().with(
        HookStage::BeforeMount,
        hook(|_app: &AppDescriptor, _global: &GlobalContext| async {
            Err(LifecycleError::app("policy", "denied"))
        }),
    );

    let loaded =
        block_on(host.load_app(orders(), &isolated_config(), hooks)).expect("load");
    let parcel = loaded.parcel_config(None);
    let err = block_on(parcel.run_mount(Map::new())).expect_err("hook rejects");
    assert!(matches!(
        err,
        LifecycleError::Hook {
            stage: HookStage::BeforeMount,
            ..
        }
    ));
    assert_eq!(parcel.status(), AppStatus::Failed);
    assert_eq!(recorder.count(":mount"), 0);
}

#[test]
fn add_ons_publish_flags_inside_the_sandbox_only() {
    let (document, _root) = page();
    let recorder = Rc::new(Recorder::default());
    let lifecycles = recording_lifecycles(&recorder);
    let seen = Rc::new(RefCell::new(None));
    let scripts = {
        let seen = seen.clone();
        ScriptFn::new(move |global, strict| {
            *seen.borrow_mut() = Some((
                global.contains(ENGINE_FLAG),
                global.get(PUBLIC_PATH_KEY).and_then(|value| value.as_data().cloned()),
                strict,
            ));
            Ok(Some(lifecycles.clone()))
        })
    };
    let host = host(&document, scripts);
    let base = GlobalEnv::new();
    let config = FrameworkConfig::default().with_base_global(base.clone());

    let loaded = block_on(host.load_app(orders(), &config, LifecycleHooks::new())).expect("load");
    assert_eq!(
        *seen.borrow(),
        Some((true, Some(json!("/assets/")), true))
    );

    let parcel = loaded.parcel_config(None);
    block_on(parcel.run_mount(Map::new())).expect("mount");
    block_on(parcel.run_unmount(Map::new())).expect("unmount");
    assert!(!base.contains(ENGINE_FLAG));
    assert!(!base.contains(PUBLIC_PATH_KEY));
}

#[test]
fn unmount_drops_the_state_subscription() {
    let (document, _root) = page();
    let received = Rc::new(RefCell::new(Vec::<StateMap>::new()));
    let lifecycles = {
        let received = received.clone();
        AppLifecycles::new(
            lifecycle_fn(move |props: AppProps| {
                let received = received.clone();
                props.on_global_state_change(
                    move |next, _previous| received.borrow_mut().push(next),
                    false,
                );
                async { Ok(()) }
            }),
            lifecycle_fn(|_props: AppProps| async { Ok(()) }),
        )
    };
    let host = host(&document, exporting(lifecycles));
    let store = host.state_store();
    let host_state = store.initialize(Map::new());

    let loaded = block_on(host.load_app(orders(), &isolated_config(), LifecycleHooks::new()))
        .expect("load");
    let parcel = loaded.parcel_config(None);
    block_on(parcel.run_mount(Map::new())).expect("mount");
    assert!(store.is_subscribed("orders"));

    let mut partial = Map::new();
    partial.insert("theme".to_string(), json!("dark"));
    assert!(host_state.update(partial.clone()));
    assert_eq!(received.borrow().len(), 1);

    block_on(parcel.run_unmount(Map::new())).expect("unmount");
    assert!(!store.is_subscribed("orders"));
    partial.insert("theme".to_string(), json!("light"));
    assert!(host_state.update(partial));
    assert_eq!(received.borrow().len(), 1);
}

#[test]
fn update_is_passed_through_with_custom_props() {
    let (document, _root) = page();
    let recorder = Rc::new(Recorder::default());
    let host = host(&document, exporting(recording_lifecycles(&recorder)));

    let loaded = block_on(host.load_app(orders(), &isolated_config(), LifecycleHooks::new()))
        .expect("load");
    let parcel = loaded.parcel_config(None);
    let update = parcel.update.clone().expect("app exports update");

    let mut custom = Map::new();
    custom.insert("route".to_string(), json!("/orders/7"));
    block_on(update(custom.clone())).expect("update");

    assert_eq!(recorder.events(), vec!["orders:update"]);
    assert_eq!(recorder.custom.borrow()[0], custom);
}
