//! Publishes the app's asset public path on its global context.
//!
//! # Invariants
//! - The value present before the first load is restored on every unmount
//!   (or the key removed when there was none).
//! - The path is re-published on every mount after the first unmount.

use crate::lifecycle::hooks::{hook, HookStage, LifecycleHooks};
use crate::sandbox::{GlobalContext, GlobalValue};
use std::cell::Cell;
use std::rc::Rc;

pub const PUBLIC_PATH_KEY: &str = "__INJECTED_PUBLIC_PATH_BY_MICROHOST__";

pub fn hooks(global: &GlobalContext, public_path: &str) -> LifecycleHooks {
    let raw_public_path = global.get(PUBLIC_PATH_KEY);
    let public_path = if public_path.is_empty() {
        "/".to_string()
    } else {
        public_path.to_string()
    };
    let mounted_once = Rc::new(Cell::new(false));

    let before_load = {
        let (global, path) = (global.clone(), public_path.clone());
        hook(move |_, _| {
            global.set(PUBLIC_PATH_KEY, GlobalValue::data(path.clone()));
            async { Ok(()) }
        })
    };
    let before_mount = {
        let (global, path, mounted_once) = (global.clone(), public_path, mounted_once.clone());
        hook(move |_, _| {
            if mounted_once.get() {
                global.set(PUBLIC_PATH_KEY, GlobalValue::data(path.clone()));
            }
            async { Ok(()) }
        })
    };
    let before_unmount = {
        let global = global.clone();
        hook(move |_, _| {
            match &raw_public_path {
                Some(raw) => global.set(PUBLIC_PATH_KEY, raw.clone()),
                None => {
                    global.remove(PUBLIC_PATH_KEY);
                }
            }
            mounted_once.set(true);
            async { Ok(()) }
        })
    };

    LifecycleHooks::new()
        .with(HookStage::BeforeLoad, before_load)
        .with(HookStage::BeforeMount, before_mount)
        .with(HookStage::BeforeUnmount, before_unmount)
}
