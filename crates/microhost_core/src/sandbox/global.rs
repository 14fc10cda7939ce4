//! Global scope seen by app scripts and hooks.

use crate::lifecycle::exports::AppLifecycles;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// A value stored on a global scope.
#[derive(Clone)]
pub enum GlobalValue {
    Data(Value),
    /// Lifecycle functions published under a global name (UMD style).
    Lifecycles(AppLifecycles),
}

impl GlobalValue {
    pub fn data(value: impl Into<Value>) -> Self {
        Self::Data(value.into())
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Self::Data(value) => Some(value),
            Self::Lifecycles(_) => None,
        }
    }

    pub fn as_lifecycles(&self) -> Option<&AppLifecycles> {
        match self {
            Self::Lifecycles(lifecycles) => Some(lifecycles),
            Self::Data(_) => None,
        }
    }
}

impl Debug for GlobalValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data(value) => write!(f, "Data({value})"),
            Self::Lifecycles(lifecycles) => write!(f, "Lifecycles({lifecycles:?})"),
        }
    }
}

/// Key/value view of a global object.
pub trait GlobalScope {
    fn get(&self, key: &str) -> Option<GlobalValue>;
    fn set(&self, key: &str, value: GlobalValue);
    /// Removes `key`, returning the value it had.
    fn remove(&self, key: &str) -> Option<GlobalValue>;
    fn keys(&self) -> Vec<String>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Shared handle to a global scope.
pub type GlobalContext = Rc<dyn GlobalScope>;

/// Plain in-memory global scope. Used as the host environment.
#[derive(Default)]
pub struct GlobalEnv {
    values: RefCell<BTreeMap<String, GlobalValue>>,
}

impl Debug for GlobalEnv {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalEnv")
            .field("keys", &self.keys())
            .finish()
    }
}

impl GlobalEnv {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }
}

impl GlobalScope for GlobalEnv {
    fn get(&self, key: &str) -> Option<GlobalValue> {
        self.values.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: GlobalValue) {
        self.values.borrow_mut().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) -> Option<GlobalValue> {
        self.values.borrow_mut().remove(key)
    }

    fn keys(&self) -> Vec<String> {
        self.values.borrow().keys().cloned().collect()
    }
}

thread_local! {
    static HOST_GLOBAL: Rc<GlobalEnv> = GlobalEnv::new();
}

/// Host environment used when no base global is configured.
pub fn host_global() -> GlobalContext {
    HOST_GLOBAL.with(|env| -> GlobalContext { env.clone() })
}
