//! Error taxonomy shared by the orchestrator and its collaborators.
//!
//! # Responsibility
//! - Classify fatal failures as configuration, runtime-element or external.
//! - Keep messages stable so hosts can surface them verbatim.
//!
//! # Invariants
//! - Validation warnings never become errors; they are logged at the call
//!   site and the engine continues with the closest safe default.

use crate::dom::MarkupError;
use crate::lifecycle::hooks::HookStage;
use crate::lifecycle::render::RenderPhase;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Coarse classification of a [`LifecycleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid exports, absent container or incompatible options.
    Configuration,
    /// An expected node was absent at a phase.
    RuntimeElement,
    /// A collaborator (loader, script, sandbox, hook, app) failed.
    External,
}

/// Fatal lifecycle errors. Every variant aborts the current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// No usable `mount`/`unmount` pair was found for the app.
    MissingLifecycles { app: String },
    /// Legacy render cannot be combined with the named isolation option.
    LegacyRenderConflict { option: &'static str },
    /// Target container could not be resolved during a render phase.
    ContainerNotFound {
        container: String,
        instance_id: String,
        phase: RenderPhase,
    },
    /// Wrapper element was torn down while still needed.
    WrapperNotFound { instance_id: String },
    /// Template markup could not be turned into a wrapper subtree.
    Markup(MarkupError),
    /// Entry loader failure.
    Entry(String),
    /// Bootstrap script execution failure.
    Script(String),
    /// Sandbox creation or mount/unmount failure.
    Sandbox(String),
    /// A lifecycle hook rejected.
    Hook { stage: HookStage, message: String },
    /// An app lifecycle function rejected.
    App { stage: String, message: String },
}

impl LifecycleError {
    /// Shorthand for failures raised by app lifecycle functions.
    pub fn app(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::App {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingLifecycles { .. }
            | Self::LegacyRenderConflict { .. }
            | Self::ContainerNotFound { .. }
            | Self::Markup(_) => ErrorKind::Configuration,
            Self::WrapperNotFound { .. } => ErrorKind::RuntimeElement,
            Self::Entry(_)
            | Self::Script(_)
            | Self::Sandbox(_)
            | Self::Hook { .. }
            | Self::App { .. } => ErrorKind::External,
        }
    }

    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingLifecycles { .. } => "lifecycle_missing",
            Self::LegacyRenderConflict { .. } => "legacy_render_conflict",
            Self::ContainerNotFound { .. } => "container_not_found",
            Self::WrapperNotFound { .. } => "wrapper_not_found",
            Self::Markup(_) => "markup_invalid",
            Self::Entry(_) => "entry_failed",
            Self::Script(_) => "script_failed",
            Self::Sandbox(_) => "sandbox_failed",
            Self::Hook { .. } => "hook_failed",
            Self::App { .. } => "app_failed",
        }
    }
}

impl Display for LifecycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingLifecycles { app } => {
                write!(f, "you need to export lifecycle functions in {app} entry")
            }
            Self::LegacyRenderConflict { option } => {
                write!(f, "{option} can not be used with legacy render")
            }
            Self::ContainerNotFound {
                container,
                instance_id,
                phase,
            } => match phase {
                RenderPhase::Loading | RenderPhase::Mounting => write!(
                    f,
                    "target container with {container} not existed while {instance_id} {}",
                    phase.as_str()
                ),
                RenderPhase::Mounted => write!(
                    f,
                    "target container with {container} not existed after {instance_id} mounted"
                ),
                RenderPhase::Unmounted => write!(
                    f,
                    "target container with {container} not existed while {instance_id} rendering"
                ),
            },
            Self::WrapperNotFound { instance_id } => {
                write!(f, "wrapper element for {instance_id} is not existed")
            }
            Self::Markup(err) => write!(f, "invalid app template: {err}"),
            Self::Entry(message) => write!(f, "entry load failed: {message}"),
            Self::Script(message) => write!(f, "script execution failed: {message}"),
            Self::Sandbox(message) => write!(f, "sandbox failure: {message}"),
            Self::Hook { stage, message } => {
                write!(f, "{} hook failed: {message}", stage.as_str())
            }
            Self::App { stage, message } => write!(f, "app {stage} failed: {message}"),
        }
    }
}

impl Error for LifecycleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Markup(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MarkupError> for LifecycleError {
    fn from(value: MarkupError) -> Self {
        Self::Markup(value)
    }
}
