//! Per-load framework configuration.
//!
//! # Responsibility
//! - Deserialize the declarative part of a load configuration.
//! - Derive the isolation switches the orchestrator acts on.
//!
//! # Invariants
//! - The sandbox is enabled unless configured as `false`.
//! - CSS scoping is only active when strict isolation is off.

use crate::model::app::AppDescriptor;
use crate::sandbox::{AssetFilter, GlobalContext};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Decides singular mode per app.
pub type SingularPredicate = Rc<dyn Fn(&AppDescriptor) -> bool>;

/// `sandbox` option: a plain switch or detailed isolation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SandboxOption {
    Enabled(bool),
    Options(SandboxOptions),
}

impl Default for SandboxOption {
    fn default() -> Self {
        Self::Enabled(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SandboxOptions {
    /// Render behind a shadow root.
    pub strict_style_isolation: bool,
    /// Rewrite app styles under a scoping prefix.
    pub experimental_style_isolation: bool,
    /// Write through to the host global and restore on unmount.
    pub loose: bool,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    pub singular: bool,
    pub sandbox: SandboxOption,
    /// Forwarded untouched to the entry loader.
    pub entry_options: Map<String, Value>,
    #[serde(skip)]
    pub singular_predicate: Option<SingularPredicate>,
    #[serde(skip)]
    pub asset_filter: Option<AssetFilter>,
    #[serde(skip)]
    pub base_global: Option<GlobalContext>,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            singular: false,
            sandbox: SandboxOption::default(),
            entry_options: Map::new(),
            singular_predicate: None,
            asset_filter: None,
            base_global: None,
        }
    }
}

impl Debug for FrameworkConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameworkConfig")
            .field("singular", &self.singular)
            .field("sandbox", &self.sandbox)
            .field("entry_options", &self.entry_options)
            .field("singular_predicate", &self.singular_predicate.is_some())
            .field("asset_filter", &self.asset_filter.is_some())
            .field("base_global", &self.base_global.is_some())
            .finish()
    }
}

impl FrameworkConfig {
    /// Parses the declarative part from JSON.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    pub fn with_singular(mut self, singular: bool) -> Self {
        self.singular = singular;
        self
    }

    pub fn with_singular_predicate(
        mut self,
        predicate: impl Fn(&AppDescriptor) -> bool + 'static,
    ) -> Self {
        self.singular_predicate = Some(Rc::new(predicate));
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxOption) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_asset_filter(mut self, filter: impl Fn(&str) -> bool + 'static) -> Self {
        self.asset_filter = Some(Rc::new(filter));
        self
    }

    pub fn with_base_global(mut self, global: GlobalContext) -> Self {
        self.base_global = Some(global);
        self
    }

    /// Whether singular mode applies to `app`. A predicate wins over the
    /// static switch.
    pub fn is_singular(&self, app: &AppDescriptor) -> bool {
        match &self.singular_predicate {
            Some(predicate) => predicate(app),
            None => self.singular,
        }
    }

    pub fn sandbox_enabled(&self) -> bool {
        !matches!(self.sandbox, SandboxOption::Enabled(false))
    }

    pub fn strict_style_isolation(&self) -> bool {
        self.options().is_some_and(|options| options.strict_style_isolation)
    }

    pub fn scoped_css(&self) -> bool {
        self.options()
            .is_some_and(|options| options.experimental_style_isolation)
            && !self.strict_style_isolation()
    }

    pub fn loose_sandbox(&self) -> bool {
        self.options().is_some_and(|options| options.loose)
    }

    fn options(&self) -> Option<&SandboxOptions> {
        match &self.sandbox {
            SandboxOption::Options(options) => Some(options),
            SandboxOption::Enabled(_) => None,
        }
    }
}
