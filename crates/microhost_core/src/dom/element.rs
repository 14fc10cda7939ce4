//! Shared element handles for the host page model.
//!
//! # Responsibility
//! - Hold tag, attributes and child nodes behind interior mutability.
//! - Notify child-list observers on structural mutation.
//! - Count real mutations so callers can assert idempotent rendering.
//!
//! # Invariants
//! - Observers are invoked after every borrow is released, so an observer may
//!   mutate the element that notified it.
//! - Clearing an already empty element is not a mutation.

use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Tag used for shadow roots attached through [`Element::attach_shadow`].
pub const SHADOW_ROOT_TAG: &str = "#shadow-root";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Callback fired when an element's direct children change.
pub type ChildListObserver = Rc<dyn Fn(&Element)>;

/// One node in an element's child list.
#[derive(Clone)]
pub enum Node {
    Element(Rc<Element>),
    Text(String),
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Element(element) => write!(f, "Element(<{}>)", element.tag()),
            Self::Text(text) => write!(f, "Text({text:?})"),
        }
    }
}

/// Host page element.
pub struct Element {
    tag: String,
    attributes: RefCell<Vec<(String, String)>>,
    children: RefCell<Vec<Node>>,
    shadow_root: RefCell<Option<Rc<Element>>>,
    observers: RefCell<Vec<ChildListObserver>>,
    mutations: Cell<u64>,
}

impl Debug for Element {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("tag", &self.tag)
            .field("attributes", &self.attributes.borrow())
            .field("children", &self.children.borrow().len())
            .finish()
    }
}

impl Element {
    /// Creates a detached element. Tags are normalized to lowercase.
    pub fn new(tag: &str) -> Rc<Self> {
        Rc::new(Self {
            tag: tag.to_ascii_lowercase(),
            attributes: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            shadow_root: RefCell::new(None),
            observers: RefCell::new(Vec::new()),
            mutations: Cell::new(0),
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_shadow_root(&self) -> bool {
        self.tag == SHADOW_ROOT_TAG
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.attributes
            .borrow()
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.clone())
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        let mut attributes = self.attributes.borrow_mut();
        match attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => attributes.push((name, value.to_string())),
        }
    }

    pub fn id(&self) -> Option<String> {
        self.attribute("id")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .map(|value| value.split_whitespace().any(|item| item == class))
            .unwrap_or(false)
    }

    /// Returns a snapshot of direct children.
    pub fn children(&self) -> Vec<Node> {
        self.children.borrow().clone()
    }

    pub fn child_elements(&self) -> Vec<Rc<Element>> {
        self.children
            .borrow()
            .iter()
            .filter_map(|node| match node {
                Node::Element(element) => Some(element.clone()),
                Node::Text(_) => None,
            })
            .collect()
    }

    pub fn first_element_child(&self) -> Option<Rc<Element>> {
        self.child_elements().into_iter().next()
    }

    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    /// Number of structural mutations applied since creation.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.get()
    }

    pub fn append_child(&self, element: Rc<Element>) {
        self.push_node(Node::Element(element));
    }

    /// Appends one text node, as runtime style injection does.
    pub fn append_text(&self, text: &str) {
        self.push_node(Node::Text(text.to_string()));
    }

    /// Removes every child. Returns how many nodes were removed.
    pub fn remove_all_children(&self) -> usize {
        let removed = std::mem::take(&mut *self.children.borrow_mut()).len();
        if removed > 0 {
            self.mutations.set(self.mutations.get() + removed as u64);
            self.notify_child_list();
        }
        removed
    }

    /// Detaches and returns all children without notifying observers.
    pub(crate) fn take_children(&self) -> Vec<Node> {
        std::mem::take(&mut *self.children.borrow_mut())
    }

    /// Appends a node during tree construction, without notification.
    pub(crate) fn push_node_silent(&self, node: Node) {
        self.children.borrow_mut().push(node);
    }

    /// Concatenated text of all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Replaces all children with a single text node.
    pub fn set_text_content(&self, text: &str) {
        {
            let mut children = self.children.borrow_mut();
            children.clear();
            if !text.is_empty() {
                children.push(Node::Text(text.to_string()));
            }
        }
        self.mutations.set(self.mutations.get() + 1);
        self.notify_child_list();
    }

    /// Returns whether `other` is this element or one of its light descendants.
    pub fn contains(&self, other: &Rc<Element>) -> bool {
        if std::ptr::eq(self, Rc::as_ptr(other)) {
            return true;
        }
        self.child_elements()
            .iter()
            .any(|child| child.contains(other))
    }

    /// Attaches (or returns the existing) shadow root.
    pub fn attach_shadow(&self) -> Rc<Element> {
        let mut slot = self.shadow_root.borrow_mut();
        slot.get_or_insert_with(|| Element::new(SHADOW_ROOT_TAG))
            .clone()
    }

    pub fn shadow_root(&self) -> Option<Rc<Element>> {
        self.shadow_root.borrow().clone()
    }

    /// Light-DOM descendants with the given tag, in document order.
    pub fn descendants_by_tag(&self, tag: &str) -> Vec<Rc<Element>> {
        let tag = tag.to_ascii_lowercase();
        let mut found = Vec::new();
        walk_elements(self, &mut |element| {
            if element.tag == tag {
                found.push(element.clone());
            }
        });
        found
    }

    /// Registers a child-list observer.
    pub fn observe_child_list(&self, observer: ChildListObserver) {
        self.observers.borrow_mut().push(observer);
    }

    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        for node in self.children.borrow().iter() {
            write_node(node, &self.tag, &mut out);
        }
        out
    }

    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }

    fn push_node(&self, node: Node) {
        self.children.borrow_mut().push(node);
        self.mutations.set(self.mutations.get() + 1);
        self.notify_child_list();
    }

    fn notify_child_list(&self) {
        let observers = self.observers.borrow().clone();
        for observer in observers {
            observer(self);
        }
    }
}

pub(crate) fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub(crate) fn is_raw_text_element(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&tag)
}

fn collect_text(element: &Element, out: &mut String) {
    for node in element.children.borrow().iter() {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(child) => collect_text(child, out),
        }
    }
}

fn walk_elements(element: &Element, visit: &mut dyn FnMut(&Rc<Element>)) {
    for child in element.child_elements() {
        visit(&child);
        walk_elements(&child, visit);
    }
}

fn write_node(node: &Node, parent_tag: &str, out: &mut String) {
    match node {
        Node::Text(text) if is_raw_text_element(parent_tag) => out.push_str(text),
        Node::Text(text) => out.push_str(&escape_text(text)),
        Node::Element(element) => write_element(element, out),
    }
}

fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.tag);
    for (name, value) in element.attributes.borrow().iter() {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&value.replace('&', "&amp;").replace('"', "&quot;"));
        out.push('"');
    }
    out.push('>');
    if is_void_element(&element.tag) {
        return;
    }
    for node in element.children.borrow().iter() {
        write_node(node, &element.tag, out);
    }
    out.push_str("</");
    out.push_str(&element.tag);
    out.push('>');
}

fn escape_text(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}
