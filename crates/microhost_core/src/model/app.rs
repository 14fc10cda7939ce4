//! App descriptor model.
//!
//! # Responsibility
//! - Describe what the host asks to load and where it should render.
//! - Carry the props handed to app lifecycle functions.
//!
//! # Invariants
//! - A descriptor is immutable for the duration of one load call.
//! - Instance ids are unique per generator: the bare name first, then
//!   `<name>_<n>` with `n` counting up from 1.

use crate::dom::Element;
use crate::state::{StateHandle, StateMap};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

/// Custom props supplied by the host when it runs lifecycle steps.
pub type HostProps = Map<String, Value>;

/// Where an app's template and scripts come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AppEntry {
    /// Remote HTML entry resolved by the entry loader.
    Url(String),
    /// Template and asset lists supplied directly.
    Inline(InlineEntry),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineEntry {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub scripts: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
}

/// Render target: a selector resolved at render time, or an element.
#[derive(Clone)]
pub enum ContainerRef {
    Selector(String),
    Element(Rc<Element>),
}

impl PartialEq for ContainerRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Selector(a), Self::Selector(b)) => a == b,
            (Self::Element(a), Self::Element(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Debug for ContainerRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Selector(selector) => write!(f, "Selector({selector:?})"),
            Self::Element(element) => write!(f, "Element(<{}>)", element.tag()),
        }
    }
}

impl Display for ContainerRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Selector(selector) => f.write_str(selector),
            Self::Element(element) => match element.id() {
                Some(id) => write!(f, "<{} id=\"{id}\">", element.tag()),
                None => write!(f, "<{}>", element.tag()),
            },
        }
    }
}

impl From<&str> for ContainerRef {
    fn from(value: &str) -> Self {
        Self::Selector(value.to_string())
    }
}

impl From<Rc<Element>> for ContainerRef {
    fn from(value: Rc<Element>) -> Self {
        Self::Element(value)
    }
}

/// Arguments handed to a legacy render callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyRenderProps {
    pub loading: bool,
    /// Wrapper markup, empty once the app is unmounted.
    pub markup: String,
}

/// Host-supplied render callback replacing container manipulation.
pub type LegacyRender = Rc<dyn Fn(LegacyRenderProps)>;

/// What the host asks to load.
#[derive(Clone)]
pub struct AppDescriptor {
    pub name: String,
    pub entry: AppEntry,
    pub container: Option<ContainerRef>,
    pub render: Option<LegacyRender>,
}

impl Debug for AppDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppDescriptor")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("container", &self.container)
            .field("legacy_render", &self.render.is_some())
            .finish()
    }
}

impl AppDescriptor {
    pub fn new(name: &str, entry: AppEntry) -> Self {
        Self {
            name: name.to_string(),
            entry,
            container: None,
            render: None,
        }
    }

    /// Descriptor whose entry is the given template markup.
    pub fn inline(name: &str, html: &str) -> Self {
        Self::new(
            name,
            AppEntry::Inline(InlineEntry {
                html: html.to_string(),
                ..InlineEntry::default()
            }),
        )
    }

    pub fn with_container(mut self, container: impl Into<ContainerRef>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_render(mut self, render: impl Fn(LegacyRenderProps) + 'static) -> Self {
        self.render = Some(Rc::new(render));
        self
    }
}

/// Props passed to app lifecycle functions.
#[derive(Debug, Clone, Default)]
pub struct AppProps {
    pub name: String,
    /// Host-supplied custom props.
    pub custom: HostProps,
    /// Element the app renders into (shadow root in strict isolation).
    pub container: Option<Rc<Element>>,
    pub global_state: Option<StateHandle>,
}

impl AppProps {
    /// `setGlobalState` as seen by the app. Returns whether anything changed.
    pub fn set_global_state(&self, partial: StateMap) -> bool {
        self.global_state
            .as_ref()
            .is_some_and(|handle| handle.update(partial))
    }

    /// `onGlobalStateChange` as seen by the app.
    pub fn on_global_state_change(
        &self,
        callback: impl Fn(StateMap, StateMap) + 'static,
        fire_immediately: bool,
    ) {
        if let Some(handle) = &self.global_state {
            handle.subscribe(callback, fire_immediately);
        }
    }
}

/// Generates instance ids so the same app can be loaded more than once.
#[derive(Debug, Default)]
pub struct InstanceIdGenerator {
    counters: RefCell<HashMap<String, usize>>,
}

impl InstanceIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, name: &str) -> String {
        let mut counters = self.counters.borrow_mut();
        match counters.get_mut(name) {
            Some(count) => {
                *count += 1;
                format!("{name}_{count}")
            }
            None => {
                counters.insert(name.to_string(), 0);
                name.to_string()
            }
        }
    }
}
