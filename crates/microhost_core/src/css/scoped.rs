//! Selector rewriting that confines rules to one wrapper subtree.
//!
//! # Responsibility
//! - Rewrite style rules so they only match under a scoping prefix.
//! - Re-rewrite a style block once when rules are injected at runtime.
//!
//! # Invariants
//! - Declarations are never modified.
//! - Keyframe selectors and other non-conditional at-rules are copied as-is.
//! - A live style block is rewritten at most once after its first mutation,
//!   even when that first text is malformed and left as-is.
//! - Sibling-of-root members of a group stay unscoped; the other members of
//!   the same group are still prefixed.

use super::parser::{parse_rules, serialize_rules, CssParseError, CssRule};
use crate::dom::Element;
use log::{debug, warn};
use regex::Regex;
use std::cell::Cell;
use std::ops::Range;
use std::rc::Rc;

/// Outcome of rewriting one selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorRewrite {
    pub selector: String,
    /// `html + x` / `html ~ x` members, kept verbatim in `selector`.
    pub unscoped: Vec<String>,
}

/// Compiled rewrite engine. One shared instance is created lazily and
/// reused for every style block.
#[derive(Debug)]
pub struct ScopedCss {
    root_token: Regex,
    root_combination: Regex,
}

impl ScopedCss {
    pub fn new() -> Self {
        debug!("event=css_processor_init module=css status=ok");
        Self {
            // Candidate root tokens; boundaries are checked by hand because
            // the previous and next characters decide whether it is a token.
            root_token: Regex::new(r"html|body|:root").expect("static regex"),
            root_combination: Regex::new(r"^html(?P<comb>\s*[>+~]\s*|\s+)(?P<rest>\S.*)$")
                .expect("static regex"),
        }
    }

    /// Rewrites parsed rules under `prefix`.
    pub fn rewrite(&self, rules: &[CssRule], prefix: &str) -> String {
        let rewritten = rules
            .iter()
            .map(|rule| self.rewrite_rule(rule, prefix))
            .collect::<Vec<_>>();
        serialize_rules(&rewritten)
    }

    /// Parses and rewrites a style text.
    pub fn scope(&self, css: &str, prefix: &str) -> Result<String, CssParseError> {
        let rules = parse_rules(css)?;
        Ok(self.rewrite(&rules, prefix))
    }

    fn rewrite_rule(&self, rule: &CssRule, prefix: &str) -> CssRule {
        match rule {
            CssRule::Style {
                selector,
                declarations,
            } => {
                let rewrite = self.rewrite_selector(selector, prefix);
                for member in &rewrite.unscoped {
                    warn!(
                        "event=css_rewrite module=css status=warn code=css_sibling_root_unsupported selector={member}"
                    );
                }
                CssRule::Style {
                    selector: rewrite.selector,
                    declarations: declarations.clone(),
                }
            }
            CssRule::Conditional {
                kind,
                condition,
                rules,
            } => CssRule::Conditional {
                kind: *kind,
                condition: condition.clone(),
                rules: rules
                    .iter()
                    .map(|nested| self.rewrite_rule(nested, prefix))
                    .collect(),
            },
            CssRule::Verbatim(_) => rule.clone(),
        }
    }

    /// Rewrites a (possibly grouped) selector member by member so it only
    /// matches under `prefix`.
    pub fn rewrite_selector(&self, selector: &str, prefix: &str) -> SelectorRewrite {
        let selector = selector.trim();
        if matches!(selector, "html" | "body" | ":root") {
            return SelectorRewrite {
                selector: prefix.to_string(),
                unscoped: Vec::new(),
            };
        }

        let mut members = Vec::new();
        let mut unscoped = Vec::new();
        for member in split_selector_list(selector) {
            let member = member.trim();
            if member.is_empty() {
                continue;
            }
            let member = match self.root_combination.captures(member) {
                Some(caps) => {
                    let comb = caps.name("comb").map(|m| m.as_str()).unwrap_or_default();
                    if comb.contains(['+', '~']) {
                        unscoped.push(member.to_string());
                        members.push(member.to_string());
                        continue;
                    }
                    caps.name("rest").map(|m| m.as_str()).unwrap_or(member)
                }
                None => member,
            };

            let tokens = self.root_token_ranges(member);
            if tokens.is_empty() {
                members.push(format!("{prefix} {member}"));
            } else {
                members.push(replace_ranges(member, &tokens, prefix));
            }
        }
        SelectorRewrite {
            selector: members.join(", "),
            unscoped,
        }
    }

    /// Rewrites the current text of `style` in place. Malformed CSS is left
    /// untouched.
    pub fn rewrite_element(&self, style: &Element, prefix: &str) {
        let text = style.text_content();
        match self.scope(&text, prefix) {
            Ok(css) => style.set_text_content(&css),
            Err(err) => warn!(
                "event=css_rewrite module=css status=warn code=css_parse_failed prefix={prefix} error={err}"
            ),
        }
    }

    /// Scopes a style element. Blocks with content are rewritten now; empty
    /// blocks are rewritten once, on their first child-list mutation.
    pub fn process(&'static self, style: &Element, prefix: &str) {
        if !style.text_content().trim().is_empty() {
            self.rewrite_element(style, prefix);
            return;
        }

        let rewritten = Rc::new(Cell::new(false));
        let prefix = prefix.to_string();
        style.observe_child_list(Rc::new(move |node: &Element| {
            if rewritten.replace(true) {
                return;
            }
            debug!("event=css_rewrite module=css status=start trigger=child_list prefix={prefix}");
            self.rewrite_element(node, &prefix);
        }));
    }

    fn root_token_ranges(&self, member: &str) -> Vec<Range<usize>> {
        let bytes = member.as_bytes();
        self.root_token
            .find_iter(member)
            .filter(|m| {
                let before_ok = m.start() == 0 || !is_compound_char(bytes[m.start() - 1]);
                let after_ok = m.end() == bytes.len() || !is_name_char(bytes[m.end()]);
                before_ok && after_ok && !inside_attribute_or_string(member, m.start())
            })
            .map(|m| m.range())
            .collect()
    }
}

impl Default for ScopedCss {
    fn default() -> Self {
        Self::new()
    }
}

fn is_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' || byte >= 0x80
}

fn is_compound_char(byte: u8) -> bool {
    is_name_char(byte) || matches!(byte, b'.' | b'#' | b':')
}

fn inside_attribute_or_string(member: &str, index: usize) -> bool {
    let mut bracket = 0usize;
    let mut quote: Option<char> = None;
    for c in member[..index].chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '[' => bracket += 1,
                ']' => bracket = bracket.saturating_sub(1),
                _ => {}
            },
        }
    }
    bracket > 0 || quote.is_some()
}

fn replace_ranges(member: &str, ranges: &[Range<usize>], prefix: &str) -> String {
    let mut out = String::with_capacity(member.len() + prefix.len() * ranges.len());
    let mut last = 0;
    for range in ranges {
        out.push_str(&member[last..range.start]);
        out.push_str(prefix);
        last = range.end;
    }
    out.push_str(&member[last..]);
    out
}

/// Splits a selector list on top-level commas.
fn split_selector_list(selector: &str) -> Vec<&str> {
    let mut members = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (index, c) in selector.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    members.push(&selector[start..index]);
                    start = index + 1;
                }
                _ => {}
            },
        }
    }
    members.push(&selector[start..]);
    members
}
