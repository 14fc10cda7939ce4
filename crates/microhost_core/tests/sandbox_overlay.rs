use futures::executor::block_on;
use microhost_core::error::LifecycleResult;
use microhost_core::sandbox::{OverlaySandboxFactory, Sandbox, SandboxFactory, SandboxRequest};
use microhost_core::{Element, GlobalContext, GlobalEnv, GlobalScope, GlobalValue};
use serde_json::json;
use std::rc::Rc;

fn request(instance_id: &str, base: GlobalContext, loose: bool) -> SandboxRequest {
    let wrapper = Element::new("div");
    SandboxRequest {
        instance_id: instance_id.to_string(),
        wrapper_getter: Rc::new(move || -> LifecycleResult<Rc<Element>> { Ok(wrapper.clone()) }),
        use_css_scoping: false,
        loose,
        asset_filter: None,
        base_global: base,
    }
}

fn data(global: &GlobalContext, key: &str) -> Option<serde_json::Value> {
    global.get(key).and_then(|value| value.as_data().cloned())
}

#[test]
fn strict_sandboxes_do_not_see_each_other() {
    let base: GlobalContext = GlobalEnv::new();
    base.set("locale", GlobalValue::data("en"));
    let factory = OverlaySandboxFactory;
    let orders = factory
        .create(request("orders", base.clone(), false))
        .expect("orders sandbox");
    let billing = factory
        .create(request("billing", base.clone(), false))
        .expect("billing sandbox");

    orders.proxy().set("locale", GlobalValue::data("fr"));
    orders.proxy().set("cart", GlobalValue::data(3));

    assert_eq!(data(&orders.proxy(), "locale"), Some(json!("fr")));
    assert_eq!(data(&billing.proxy(), "locale"), Some(json!("en")));
    assert!(!billing.proxy().contains("cart"));
    assert_eq!(data(&base, "locale"), Some(json!("en")));
}

#[test]
fn strict_sandbox_state_survives_remount() {
    let base: GlobalContext = GlobalEnv::new();
    let sandbox = OverlaySandboxFactory
        .create(request("orders", base.clone(), false))
        .expect("sandbox");
    let proxy = sandbox.proxy();

    block_on(sandbox.mount()).expect("mount");
    proxy.set("router", GlobalValue::data("ready"));
    block_on(sandbox.unmount()).expect("unmount");
    block_on(sandbox.mount()).expect("remount");

    assert_eq!(data(&proxy, "router"), Some(json!("ready")));
    assert!(!base.contains("router"));
}

#[test]
fn loose_sandbox_restores_host_values_on_unmount() {
    let base: GlobalContext = GlobalEnv::new();
    base.set("title", GlobalValue::data("host"));
    let sandbox = OverlaySandboxFactory
        .create(request("orders", base.clone(), true))
        .expect("sandbox");
    let proxy = sandbox.proxy();

    block_on(sandbox.mount()).expect("mount");
    proxy.set("title", GlobalValue::data("orders"));
    proxy.remove("title");
    proxy.set("jquery", GlobalValue::data(true));
    assert!(!base.contains("title"));
    assert!(base.contains("jquery"));

    block_on(sandbox.unmount()).expect("unmount");
    assert_eq!(data(&base, "title"), Some(json!("host")));
    assert!(!base.contains("jquery"));
    assert_eq!(sandbox.latest_set_prop().as_deref(), Some("jquery"));
}
