//! Lifecycle functions exported by an app script.

use crate::error::{LifecycleError, LifecycleResult};
use crate::model::app::AppProps;
use crate::sandbox::GlobalContext;
use futures::future::LocalBoxFuture;
use log::{debug, warn};
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::rc::Rc;

/// One app lifecycle function.
pub type LifecycleFn = Rc<dyn Fn(AppProps) -> LocalBoxFuture<'static, LifecycleResult<()>>>;

/// Wraps an async closure as a [`LifecycleFn`].
pub fn lifecycle_fn<F, Fut>(f: F) -> LifecycleFn
where
    F: Fn(AppProps) -> Fut + 'static,
    Fut: Future<Output = LifecycleResult<()>> + 'static,
{
    Rc::new(move |props: AppProps| -> LocalBoxFuture<'static, LifecycleResult<()>> {
        Box::pin(f(props))
    })
}

/// Lifecycle export object. Any field may be missing; see [`Self::is_valid`].
#[derive(Clone, Default)]
pub struct AppLifecycles {
    pub bootstrap: Option<LifecycleFn>,
    pub mount: Option<LifecycleFn>,
    pub unmount: Option<LifecycleFn>,
    pub update: Option<LifecycleFn>,
}

impl Debug for AppLifecycles {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppLifecycles")
            .field("bootstrap", &self.bootstrap.is_some())
            .field("mount", &self.mount.is_some())
            .field("unmount", &self.unmount.is_some())
            .field("update", &self.update.is_some())
            .finish()
    }
}

impl AppLifecycles {
    pub fn new(mount: LifecycleFn, unmount: LifecycleFn) -> Self {
        Self {
            mount: Some(mount),
            unmount: Some(unmount),
            ..Self::default()
        }
    }

    pub fn with_bootstrap(mut self, bootstrap: LifecycleFn) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    pub fn with_update(mut self, update: LifecycleFn) -> Self {
        self.update = Some(update);
        self
    }

    /// `mount` and `unmount` are required; the rest is optional.
    pub fn is_valid(&self) -> bool {
        self.mount.is_some() && self.unmount.is_some()
    }
}

/// Where the lifecycle functions were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSource {
    Exports,
    LatestSetProp,
    GlobalName,
}

/// Validated lifecycle functions.
#[derive(Clone)]
pub struct ResolvedLifecycles {
    pub source: LifecycleSource,
    pub bootstrap: Option<LifecycleFn>,
    pub mount: LifecycleFn,
    pub unmount: LifecycleFn,
    pub update: Option<LifecycleFn>,
}

impl Debug for ResolvedLifecycles {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedLifecycles")
            .field("source", &self.source)
            .field("bootstrap", &self.bootstrap.is_some())
            .field("update", &self.update.is_some())
            .finish_non_exhaustive()
    }
}

impl ResolvedLifecycles {
    fn from_valid(source: LifecycleSource, lifecycles: &AppLifecycles) -> Option<Self> {
        Some(Self {
            source,
            bootstrap: lifecycles.bootstrap.clone(),
            mount: lifecycles.mount.clone()?,
            unmount: lifecycles.unmount.clone()?,
            update: lifecycles.update.clone(),
        })
    }
}

/// Picks lifecycle functions by priority: script exports, then the global
/// most recently assigned inside the sandbox, then the global named after
/// the app.
pub fn resolve_lifecycles(
    exports: Option<&AppLifecycles>,
    latest_set_prop: Option<&str>,
    global: &GlobalContext,
    app_name: &str,
) -> LifecycleResult<ResolvedLifecycles> {
    if let Some(resolved) =
        exports.and_then(|exports| ResolvedLifecycles::from_valid(LifecycleSource::Exports, exports))
    {
        return Ok(resolved);
    }

    if let Some(key) = latest_set_prop {
        let candidate = global
            .get(key)
            .and_then(|value| value.as_lifecycles().cloned());
        if let Some(resolved) = candidate
            .as_ref()
            .and_then(|lifecycles| ResolvedLifecycles::from_valid(LifecycleSource::LatestSetProp, lifecycles))
        {
            debug!("event=lifecycle_resolve module=lifecycle status=ok app={app_name} source=latest_set_prop key={key}");
            return Ok(resolved);
        }
    }

    warn!(
        "event=lifecycle_resolve module=lifecycle status=warn code=lifecycle_global_fallback app={app_name}"
    );
    global
        .get(app_name)
        .and_then(|value| value.as_lifecycles().cloned())
        .as_ref()
        .and_then(|lifecycles| ResolvedLifecycles::from_valid(LifecycleSource::GlobalName, lifecycles))
        .ok_or_else(|| LifecycleError::MissingLifecycles {
            app: app_name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{lifecycle_fn, resolve_lifecycles, AppLifecycles, LifecycleSource};
    use crate::error::LifecycleError;
    use crate::sandbox::{GlobalContext, GlobalEnv, GlobalScope, GlobalValue};

    fn noop_lifecycles() -> AppLifecycles {
        AppLifecycles::new(
            lifecycle_fn(|_| async { Ok(()) }),
            lifecycle_fn(|_| async { Ok(()) }),
        )
    }

    #[test]
    fn prefers_exports_over_globals() {
        let global: GlobalContext = GlobalEnv::new();
        global.set("orders", GlobalValue::Lifecycles(noop_lifecycles()));
        let resolved = resolve_lifecycles(Some(&noop_lifecycles()), None, &global, "orders")
            .expect("exports are valid");
        assert_eq!(resolved.source, LifecycleSource::Exports);
    }

    #[test]
    fn partial_exports_fall_back_to_latest_set_prop_then_name() {
        let global: GlobalContext = GlobalEnv::new();
        let partial = AppLifecycles {
            mount: Some(lifecycle_fn(|_| async { Ok(()) })),
            ..AppLifecycles::default()
        };
        global.set("webpackJsonp_orders", GlobalValue::Lifecycles(noop_lifecycles()));
        let resolved =
            resolve_lifecycles(Some(&partial), Some("webpackJsonp_orders"), &global, "orders")
                .expect("latest prop holds lifecycles");
        assert_eq!(resolved.source, LifecycleSource::LatestSetProp);

        global.set("orders", GlobalValue::Lifecycles(noop_lifecycles()));
        let resolved = resolve_lifecycles(None, Some("missing"), &global, "orders")
            .expect("global name holds lifecycles");
        assert_eq!(resolved.source, LifecycleSource::GlobalName);
    }

    #[test]
    fn exhausting_sources_is_a_configuration_error() {
        let global: GlobalContext = GlobalEnv::new();
        global.set("orders", GlobalValue::data("not lifecycles"));
        let err = resolve_lifecycles(None, None, &global, "orders").expect_err("nothing exported");
        assert_eq!(
            err,
            LifecycleError::MissingLifecycles {
                app: "orders".to_string()
            }
        );
    }
}
