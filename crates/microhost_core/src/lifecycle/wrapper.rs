//! Wrapper element construction and lookup.
//!
//! # Responsibility
//! - Wrap an app template in one element keyed by instance id.
//! - Apply the configured style isolation (shadow root or CSS scoping).
//! - Resolve the element an app renders into at call time.
//!
//! # Invariants
//! - Strict isolation degrades to no isolation when the document cannot
//!   attach shadow roots; it never fails the load.
//! - Legacy render is incompatible with both isolation modes.

use crate::css::{self, CSS_REWRITE_ATTR};
use crate::dom::{parse_fragment, Document, Element, Node};
use crate::error::{LifecycleError, LifecycleResult};
use crate::sandbox::WrapperGetter;
use log::{debug, warn};
use std::cell::RefCell;
use std::rc::Rc;

/// Current wrapper of one instance; `None` once torn down.
pub type WrapperSlot = Rc<RefCell<Option<Rc<Element>>>>;

/// Isolation settings for one instance's wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperOptions {
    pub instance_id: String,
    pub strict_style_isolation: bool,
    pub scoped_css: bool,
    pub legacy_render: bool,
}

/// DOM id of an instance's wrapper element.
pub fn wrapper_id(instance_id: &str) -> String {
    format!("__microhost_wrapper_for_{}__", snake_case(instance_id))
}

/// Wraps `template` in the instance's wrapper element markup.
pub fn default_template_wrapper(instance_id: &str, app_name: &str, template: &str) -> String {
    format!(
        "<div id=\"{}\" data-name=\"{app_name}\">{template}</div>",
        wrapper_id(instance_id)
    )
}

/// Rejects legacy render combined with an isolation mode.
pub fn check_legacy_render(options: &WrapperOptions) -> LifecycleResult<()> {
    if !options.legacy_render {
        return Ok(());
    }
    if options.strict_style_isolation {
        return Err(LifecycleError::LegacyRenderConflict {
            option: "strict_style_isolation",
        });
    }
    if options.scoped_css {
        return Err(LifecycleError::LegacyRenderConflict {
            option: "experimental_style_isolation",
        });
    }
    Ok(())
}

/// Builds the wrapper element from wrapped markup.
pub fn create_wrapper_element(
    document: &Document,
    markup: &str,
    options: &WrapperOptions,
) -> LifecycleResult<Rc<Element>> {
    let app_element = parse_fragment(markup)?
        .into_iter()
        .find_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
        .ok_or_else(|| LifecycleError::WrapperNotFound {
            instance_id: options.instance_id.clone(),
        })?;

    if options.strict_style_isolation {
        if document.supports_shadow_dom() {
            let shadow = app_element.attach_shadow();
            for node in app_element.take_children() {
                shadow.push_node_silent(node);
            }
        } else {
            warn!(
                "event=wrapper_create module=lifecycle status=warn code=strict_isolation_unsupported instance_id={}",
                options.instance_id
            );
        }
    }

    if options.scoped_css {
        if app_element.attribute(CSS_REWRITE_ATTR).is_none() {
            app_element.set_attribute(CSS_REWRITE_ATTR, &options.instance_id);
        }
        let mut sheets = app_element.descendants_by_tag("style");
        sheets.extend(
            app_element
                .descendants_by_tag("link")
                .into_iter()
                .filter(|link| link.attribute("rel").as_deref() == Some("stylesheet")),
        );
        for sheet in &sheets {
            css::process(&app_element, sheet, &options.instance_id);
        }
    }

    debug!(
        "event=wrapper_create module=lifecycle status=ok instance_id={} strict={} scoped={}",
        options.instance_id, options.strict_style_isolation, options.scoped_css
    );
    Ok(app_element)
}

/// Returns a getter resolving the element the app renders into: the
/// element found by wrapper id under legacy render, the shadow root under
/// strict isolation, the wrapper itself otherwise.
pub fn wrapper_getter(
    document: Rc<Document>,
    options: WrapperOptions,
    slot: WrapperSlot,
) -> WrapperGetter {
    Rc::new(move || -> LifecycleResult<Rc<Element>> {
        let missing = || LifecycleError::WrapperNotFound {
            instance_id: options.instance_id.clone(),
        };
        if options.legacy_render {
            check_legacy_render(&options)?;
            return document
                .get_element_by_id(&wrapper_id(&options.instance_id))
                .ok_or_else(missing);
        }

        let element = slot.borrow().clone().ok_or_else(missing)?;
        if options.strict_style_isolation && document.supports_shadow_dom() {
            return element.shadow_root().ok_or_else(missing);
        }
        Ok(element)
    })
}

/// Lowercase words joined by `_`, splitting on separators and
/// lower-to-upper case changes.
fn snake_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let mut previous_lower = false;
    for c in value.chars() {
        if !c.is_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            previous_lower = false;
            continue;
        }
        if c.is_uppercase() && previous_lower && !out.ends_with('_') {
            out.push('_');
        }
        out.extend(c.to_lowercase());
        previous_lower = c.is_lowercase() || c.is_ascii_digit();
    }
    out.trim_end_matches('_').to_string()
}
