use microhost_core::{AppProps, GlobalStateStore, StateMap};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

fn map(value: Value) -> StateMap {
    match value {
        Value::Object(map) => map,
        _ => panic!("fixture must be an object"),
    }
}

type Seen = Rc<RefCell<Vec<(StateMap, StateMap)>>>;

fn watch(props: &AppProps, fire_immediately: bool) -> Seen {
    let seen: Seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    props.on_global_state_change(
        move |next, previous| sink.borrow_mut().push((next, previous)),
        fire_immediately,
    );
    seen
}

fn app_props(store: &Rc<GlobalStateStore>, name: &str) -> AppProps {
    AppProps {
        name: name.to_string(),
        global_state: Some(store.handle(name, false)),
        ..AppProps::default()
    }
}

#[test]
fn host_and_apps_share_one_state() {
    let store = GlobalStateStore::new();
    let host = store.initialize(map(json!({ "user": "ann", "theme": "light" })));
    let orders = app_props(&store, "orders");
    let billing = app_props(&store, "billing");

    let orders_seen = watch(&orders, false);
    let billing_seen = watch(&billing, true);
    assert_eq!(orders_seen.borrow().len(), 0);
    assert_eq!(billing_seen.borrow().len(), 1);

    assert!(orders.set_global_state(map(json!({ "theme": "dark" }))));
    let (next, previous) = orders_seen.borrow()[0].clone();
    assert_eq!(next, map(json!({ "user": "ann", "theme": "dark" })));
    assert_eq!(previous, map(json!({ "user": "ann", "theme": "light" })));
    assert_eq!(billing_seen.borrow().len(), 2);

    assert!(host.update(map(json!({ "locale": "fr" }))));
    assert_eq!(store.snapshot().get("locale"), Some(&json!("fr")));
    assert_eq!(orders_seen.borrow().len(), 2);
}

#[test]
fn apps_cannot_declare_new_keys() {
    let store = GlobalStateStore::new();
    store.initialize(map(json!({ "user": "ann" })));
    let orders = app_props(&store, "orders");
    let seen = watch(&orders, false);

    assert!(!orders.set_global_state(map(json!({ "token": "secret" }))));
    assert_eq!(store.snapshot(), map(json!({ "user": "ann" })));
    assert!(seen.borrow().is_empty());
}

#[test]
fn resubscribing_replaces_the_previous_listener() {
    let store = GlobalStateStore::new();
    let host = store.initialize(map(json!({ "n": 0 })));
    let orders = app_props(&store, "orders");

    let first = watch(&orders, false);
    let second = watch(&orders, false);
    assert_eq!(store.subscriber_count(), 1);

    host.update(map(json!({ "n": 1 })));
    assert!(first.borrow().is_empty());
    assert_eq!(second.borrow().len(), 1);
}

#[test]
fn unsubscribed_apps_stop_receiving_changes() {
    let store = GlobalStateStore::new();
    let host = store.initialize(map(json!({ "n": 0 })));
    let orders = app_props(&store, "orders");
    let seen = watch(&orders, false);

    let handle = orders.global_state.clone().expect("state handle");
    assert!(handle.unsubscribe());
    assert!(!store.is_subscribed("orders"));

    host.update(map(json!({ "n": 1 })));
    assert!(seen.borrow().is_empty());
}

#[test]
fn props_without_state_are_inert() {
    let props = AppProps::default();
    assert!(!props.set_global_state(map(json!({ "n": 1 }))));
    let seen = watch(&props, true);
    assert!(seen.borrow().is_empty());
}

#[test]
fn mutating_a_delivered_state_does_not_leak_into_the_store() {
    let store = GlobalStateStore::new();
    let host = store.initialize(map(json!({ "user": "ann", "theme": "light" })));

    store.handle("orders", false).subscribe(
        |mut next, mut previous| {
            next.insert("injected".to_string(), json!(true));
            next.remove("user");
            previous.clear();
        },
        false,
    );
    assert!(host.update(map(json!({ "theme": "dark" }))));

    let expected = map(json!({ "user": "ann", "theme": "dark" }));
    assert_eq!(store.snapshot(), expected);

    let billing = app_props(&store, "billing");
    let seen = watch(&billing, true);
    assert_eq!(seen.borrow()[0], (expected.clone(), expected));
}
