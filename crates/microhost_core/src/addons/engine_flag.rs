//! Marks the global context as running under the orchestrator.

use crate::lifecycle::hooks::{hook, HookStage, LifecycleHooks};
use crate::sandbox::{GlobalContext, GlobalValue};

pub const ENGINE_FLAG: &str = "__POWERED_BY_MICROHOST__";

pub fn hooks(global: &GlobalContext) -> LifecycleHooks {
    let set_flag = |global: GlobalContext| {
        hook(move |_, _| {
            let global = global.clone();
            async move {
                global.set(ENGINE_FLAG, GlobalValue::data(true));
                Ok(())
            }
        })
    };
    let target = global.clone();
    let clear_flag = hook(move |_, _| {
        let global = target.clone();
        async move {
            global.remove(ENGINE_FLAG);
            Ok(())
        }
    });

    LifecycleHooks::new()
        .with(HookStage::BeforeLoad, set_flag(global.clone()))
        .with(HookStage::BeforeMount, set_flag(global.clone()))
        .with(HookStage::BeforeUnmount, clear_flag)
}
