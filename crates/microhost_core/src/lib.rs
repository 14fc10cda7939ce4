//! Core runtime for composing independently built apps into one host page.
//!
//! The orchestrator loads apps through an injected entry loader, isolates
//! their globals and styles, and hands the host reusable mount/unmount step
//! lists.

pub mod addons;
pub mod config;
pub mod css;
pub mod dom;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod sandbox;
pub mod state;

pub use config::{FrameworkConfig, SandboxOption, SandboxOptions};
pub use css::{scope_css, scoping_prefix, CssParseError};
pub use dom::{Document, Element};
pub use error::{ErrorKind, LifecycleError, LifecycleResult};
pub use lifecycle::{
    AppLifecycles, AppStatus, EntryLoader, LifecycleHooks, LoadedApp, LoadedEntry, MicroHost,
    ParcelConfig, ScriptExecutor,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::app::{AppDescriptor, AppEntry, AppProps, ContainerRef, HostProps};
pub use sandbox::{GlobalContext, GlobalEnv, GlobalScope, GlobalValue};
pub use state::{init_global_state, GlobalStateStore, StateHandle, StateMap};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
