//! CSS scoping engine.
//!
//! # Responsibility
//! - Parse style blocks into rules and rewrite their selectors under a
//!   per-instance scoping prefix.
//! - Track runtime style injection through child-list observation.
//!
//! # Invariants
//! - The rewrite engine is created lazily once per process and shared.
//! - Scoping never fails a load: unsupported or malformed styles are left
//!   as they are and reported with `log::warn!`.
//!
//! # See also
//! - `lifecycle::wrapper` for where style blocks are handed to the engine.

pub mod parser;
pub mod scoped;

use crate::dom::Element;
use log::warn;
use once_cell::sync::Lazy;

pub use parser::{parse_rules, serialize_rules, ConditionKind, CssParseError, CssRule};
pub use scoped::{ScopedCss, SelectorRewrite};

/// Attribute marking a wrapper as the root of a scoped subtree.
pub const CSS_REWRITE_ATTR: &str = "data-microhost";

static PROCESSOR: Lazy<ScopedCss> = Lazy::new(ScopedCss::new);

/// Builds the selector prefix for a wrapper tag and instance id.
pub fn scoping_prefix(wrapper_tag: &str, instance_id: &str) -> String {
    format!(
        "{}[{CSS_REWRITE_ATTR}=\"{instance_id}\"]",
        wrapper_tag.to_ascii_lowercase()
    )
}

/// Rewrites style text under `prefix` with the shared engine.
pub fn scope_css(css: &str, prefix: &str) -> Result<String, CssParseError> {
    PROCESSOR.scope(css, prefix)
}

/// Scopes one style element found under `app_wrapper`.
///
/// Only inline `<style>` blocks can be rewritten; linked stylesheets are
/// skipped with a warning.
pub fn process(app_wrapper: &Element, stylesheet: &Element, instance_id: &str) {
    if stylesheet.tag() == "link" {
        warn!(
            "event=css_process module=css status=warn code=stylesheet_link_unsupported instance_id={instance_id} href={}",
            stylesheet.attribute("href").unwrap_or_default()
        );
        return;
    }
    if stylesheet.tag() != "style" {
        return;
    }

    let prefix = scoping_prefix(app_wrapper.tag(), instance_id);
    PROCESSOR.process(stylesheet, &prefix);
}
