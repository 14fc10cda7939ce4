//! Host page document: container lookup and runtime capabilities.

use super::element::Element;
use crate::model::app::ContainerRef;
use std::rc::Rc;

/// Host page root plus the capabilities the orchestrator probes for.
#[derive(Debug)]
pub struct Document {
    body: Rc<Element>,
    shadow_dom_supported: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates a document whose runtime supports shadow roots.
    pub fn new() -> Self {
        Self {
            body: Element::new("body"),
            shadow_dom_supported: true,
        }
    }

    /// Creates a document whose runtime lacks shadow-root support.
    pub fn without_shadow_dom() -> Self {
        Self {
            shadow_dom_supported: false,
            ..Self::new()
        }
    }

    pub fn body(&self) -> Rc<Element> {
        self.body.clone()
    }

    pub fn supports_shadow_dom(&self) -> bool {
        self.shadow_dom_supported
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<Rc<Element>> {
        find_first(&self.body, &|element| element.id().as_deref() == Some(id))
    }

    /// Supports `#id`, `.class`, `tag`, `tag.class` and `tag[attr="value"]`.
    pub fn query_selector(&self, selector: &str) -> Option<Rc<Element>> {
        let compound = CompoundSelector::parse(selector)?;
        find_first(&self.body, &|element| compound.matches(element))
    }

    /// Resolves a container reference. Element references resolve to
    /// themselves whether or not they are attached.
    pub fn resolve_container(&self, container: &ContainerRef) -> Option<Rc<Element>> {
        match container {
            ContainerRef::Selector(selector) => self.query_selector(selector),
            ContainerRef::Element(element) => Some(element.clone()),
        }
    }
}

fn find_first(root: &Rc<Element>, predicate: &dyn Fn(&Element) -> bool) -> Option<Rc<Element>> {
    for child in root.child_elements() {
        if predicate(&child) {
            return Some(child);
        }
        if let Some(found) = find_first(&child, predicate) {
            return Some(found);
        }
    }
    None
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CompoundSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attribute: Option<(String, Option<String>)>,
}

impl CompoundSelector {
    fn parse(selector: &str) -> Option<Self> {
        let selector = selector.trim();
        if selector.is_empty() || selector.contains(char::is_whitespace) {
            return None;
        }

        let mut compound = Self::default();
        let (head, attribute) = match selector.find('[') {
            Some(open) => {
                let body = selector[open + 1..].strip_suffix(']')?;
                let attribute = match body.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim().trim_matches(|c: char| c == '"' || c == '\'');
                        (name.trim().to_string(), Some(value.to_string()))
                    }
                    None => (body.trim().to_string(), None),
                };
                (&selector[..open], Some(attribute))
            }
            None => (selector, None),
        };
        compound.attribute = attribute;

        let mut rest = head;
        let tag_len = rest.find(|c: char| c == '#' || c == '.').unwrap_or(rest.len());
        if tag_len > 0 {
            compound.tag = Some(rest[..tag_len].to_ascii_lowercase());
        }
        rest = &rest[tag_len..];
        while !rest.is_empty() {
            let marker = rest.chars().next()?;
            let body = &rest[1..];
            let len = body.find(|c: char| c == '#' || c == '.').unwrap_or(body.len());
            let name = body[..len].to_string();
            if name.is_empty() {
                return None;
            }
            match marker {
                '#' => compound.id = Some(name),
                '.' => compound.classes.push(name),
                _ => return None,
            }
            rest = &body[len..];
        }
        Some(compound)
    }

    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if element.tag() != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id().as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|class| element.has_class(class)) {
            return false;
        }
        match &self.attribute {
            Some((name, Some(value))) => element.attribute(name).as_deref() == Some(value.as_str()),
            Some((name, None)) => element.attribute(name).is_some(),
            None => true,
        }
    }
}
