//! Entry loading contracts.
//!
//! Fetching and parsing app resources happens outside the orchestrator; it
//! only consumes the template, the public path and a script executor.

use super::exports::AppLifecycles;
use crate::error::LifecycleResult;
use crate::model::app::AppEntry;
use crate::sandbox::GlobalContext;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Runs an app's bootstrap scripts against a global context.
#[async_trait(?Send)]
pub trait ScriptExecutor {
    /// Returns the script's export object, if it produced one.
    async fn exec_scripts(
        &self,
        global: GlobalContext,
        strict_global: bool,
    ) -> LifecycleResult<Option<AppLifecycles>>;
}

/// Result of loading an entry.
#[derive(Clone)]
pub struct LoadedEntry {
    pub template: String,
    pub asset_public_path: String,
    pub scripts: Rc<dyn ScriptExecutor>,
}

impl Debug for LoadedEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedEntry")
            .field("template_len", &self.template.len())
            .field("asset_public_path", &self.asset_public_path)
            .finish()
    }
}

/// Fetches and parses an app entry.
#[async_trait(?Send)]
pub trait EntryLoader {
    async fn load(&self, entry: &AppEntry, options: &Map<String, Value>)
        -> LifecycleResult<LoadedEntry>;
}

type ScriptBody = dyn Fn(&GlobalContext, bool) -> LifecycleResult<Option<AppLifecycles>>;

/// Script executor backed by a synchronous closure.
pub struct ScriptFn(Rc<ScriptBody>);

impl ScriptFn {
    pub fn new(
        body: impl Fn(&GlobalContext, bool) -> LifecycleResult<Option<AppLifecycles>> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self(Rc::new(body)))
    }
}

#[async_trait(?Send)]
impl ScriptExecutor for ScriptFn {
    async fn exec_scripts(
        &self,
        global: GlobalContext,
        strict_global: bool,
    ) -> LifecycleResult<Option<AppLifecycles>> {
        (self.0)(&global, strict_global)
    }
}
