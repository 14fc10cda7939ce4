//! Overlay sandbox over a shared base environment.
//!
//! # Responsibility
//! - Strict mode: keep an instance's writes in a private overlay; reads
//!   fall through to the base.
//! - Loose mode: write through to the base while recording a diff that is
//!   reverted on unmount and re-applied on mount.
//!
//! # Invariants
//! - Writes while inactive are dropped.
//! - After a loose unmount the base holds exactly the values it had before
//!   the instance first touched each key.

use super::{
    AssetFilter, GlobalContext, GlobalScope, GlobalValue, Sandbox, SandboxFactory,
    SandboxRequest, WrapperGetter,
};
use crate::dom::Element;
use crate::error::LifecycleResult;
use async_trait::async_trait;
use log::{debug, info};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// Default sandbox factory.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverlaySandboxFactory;

impl SandboxFactory for OverlaySandboxFactory {
    fn create(&self, request: SandboxRequest) -> LifecycleResult<Rc<dyn Sandbox>> {
        Ok(Rc::new(OverlaySandbox::new(request)))
    }
}

// `None` marks a key deleted by the instance.
type Diff = BTreeMap<String, Option<GlobalValue>>;

struct OverlayScope {
    instance_id: String,
    base: GlobalContext,
    loose: bool,
    active: Cell<bool>,
    // Strict: the private overlay. Loose: the instance's current values.
    writes: RefCell<Diff>,
    // Loose only: base values before the first write to each key.
    originals: RefCell<Diff>,
    latest_set_prop: RefCell<Option<String>>,
}

impl OverlayScope {
    fn record(&self, key: &str, value: Option<GlobalValue>) -> bool {
        if !self.active.get() {
            debug!(
                "event=sandbox_write module=sandbox status=warn instance_id={} key={key} reason=inactive",
                self.instance_id
            );
            return false;
        }
        if self.loose {
            self.originals
                .borrow_mut()
                .entry(key.to_string())
                .or_insert_with(|| self.base.get(key));
            match &value {
                Some(value) => self.base.set(key, value.clone()),
                None => {
                    self.base.remove(key);
                }
            }
        }
        self.writes.borrow_mut().insert(key.to_string(), value);
        true
    }

    fn restore_base(&self) {
        for (key, original) in self.originals.borrow().iter() {
            match original {
                Some(value) => self.base.set(key, value.clone()),
                None => {
                    self.base.remove(key);
                }
            }
        }
    }

    fn reapply_writes(&self) {
        for (key, value) in self.writes.borrow().iter() {
            match value {
                Some(value) => self.base.set(key, value.clone()),
                None => {
                    self.base.remove(key);
                }
            }
        }
    }
}

impl GlobalScope for OverlayScope {
    fn get(&self, key: &str) -> Option<GlobalValue> {
        if !self.loose {
            if let Some(entry) = self.writes.borrow().get(key) {
                return entry.clone();
            }
        }
        self.base.get(key)
    }

    fn set(&self, key: &str, value: GlobalValue) {
        if self.record(key, Some(value)) {
            *self.latest_set_prop.borrow_mut() = Some(key.to_string());
        }
    }

    fn remove(&self, key: &str) -> Option<GlobalValue> {
        let previous = self.get(key);
        self.record(key, None);
        previous
    }

    fn keys(&self) -> Vec<String> {
        let mut keys = self.base.keys().into_iter().collect::<BTreeSet<_>>();
        if !self.loose {
            for (key, value) in self.writes.borrow().iter() {
                match value {
                    Some(_) => keys.insert(key.clone()),
                    None => keys.remove(key),
                };
            }
        }
        keys.into_iter().collect()
    }
}

/// Sandbox backed by an explicit key/value overlay.
pub struct OverlaySandbox {
    scope: Rc<OverlayScope>,
    wrapper_getter: WrapperGetter,
    use_css_scoping: bool,
    asset_filter: Option<AssetFilter>,
    mounts: Cell<u32>,
}

impl OverlaySandbox {
    pub fn new(request: SandboxRequest) -> Self {
        info!(
            "event=sandbox_create module=sandbox status=ok instance_id={} loose={} css_scoping={}",
            request.instance_id, request.loose, request.use_css_scoping
        );
        Self {
            scope: Rc::new(OverlayScope {
                instance_id: request.instance_id,
                base: request.base_global,
                loose: request.loose,
                active: Cell::new(true),
                writes: RefCell::new(BTreeMap::new()),
                originals: RefCell::new(BTreeMap::new()),
                latest_set_prop: RefCell::new(None),
            }),
            wrapper_getter: request.wrapper_getter,
            use_css_scoping: request.use_css_scoping,
            asset_filter: request.asset_filter,
            mounts: Cell::new(0),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.scope.instance_id
    }

    pub fn is_active(&self) -> bool {
        self.scope.active.get()
    }

    pub fn is_loose(&self) -> bool {
        self.scope.loose
    }

    pub fn css_scoping(&self) -> bool {
        self.use_css_scoping
    }

    /// Element dynamically injected nodes are attached to.
    pub fn wrapper_element(&self) -> LifecycleResult<Rc<Element>> {
        (self.wrapper_getter)()
    }

    /// Whether `url` bypasses the sandbox.
    pub fn is_asset_excluded(&self, url: &str) -> bool {
        self.asset_filter
            .as_ref()
            .is_some_and(|filter| filter(url))
    }
}

#[async_trait(?Send)]
impl Sandbox for OverlaySandbox {
    fn proxy(&self) -> GlobalContext {
        self.scope.clone()
    }

    fn latest_set_prop(&self) -> Option<String> {
        self.scope.latest_set_prop.borrow().clone()
    }

    async fn mount(&self) -> LifecycleResult<()> {
        let mounts = self.mounts.get() + 1;
        self.mounts.set(mounts);
        if self.scope.loose && mounts > 1 {
            self.scope.reapply_writes();
        }
        self.scope.active.set(true);
        debug!(
            "event=sandbox_mount module=sandbox status=ok instance_id={} mounts={mounts}",
            self.instance_id()
        );
        Ok(())
    }

    async fn unmount(&self) -> LifecycleResult<()> {
        if self.scope.loose {
            self.scope.restore_base();
        }
        self.scope.active.set(false);
        debug!(
            "event=sandbox_unmount module=sandbox status=ok instance_id={}",
            self.instance_id()
        );
        Ok(())
    }
}
