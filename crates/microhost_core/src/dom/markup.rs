//! Tolerant fragment parser for app templates.
//!
//! Handles elements, quoted/unquoted attributes, void elements, raw-text
//! elements (`style`, `script`), comments and doctypes. Unclosed elements
//! are closed at end of input; stray end tags are ignored.

use super::element::{is_raw_text_element, is_void_element, Element, Node};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// Template markup parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    UnterminatedTag { offset: usize },
    UnterminatedComment { offset: usize },
    UnterminatedRawText { tag: String, offset: usize },
}

impl Display for MarkupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnterminatedTag { offset } => write!(f, "unterminated tag at byte {offset}"),
            Self::UnterminatedComment { offset } => {
                write!(f, "unterminated comment at byte {offset}")
            }
            Self::UnterminatedRawText { tag, offset } => {
                write!(f, "missing </{tag}> for element opened at byte {offset}")
            }
        }
    }
}

impl Error for MarkupError {}

/// Parses a markup fragment into top-level nodes.
pub fn parse_fragment(markup: &str) -> Result<Vec<Node>, MarkupError> {
    FragmentParser::new(markup).run()
}

struct FragmentParser<'a> {
    input: &'a str,
    pos: usize,
    roots: Vec<Node>,
    open: Vec<Rc<Element>>,
}

impl<'a> FragmentParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            roots: Vec::new(),
            open: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Node>, MarkupError> {
        let input = self.input;
        while self.pos < self.input.len() {
            let rest = &input[self.pos..];
            let Some(lt) = rest.find('<') else {
                self.push_text(rest);
                break;
            };
            if lt > 0 {
                self.push_text(&rest[..lt]);
                self.pos += lt;
                continue;
            }

            if rest.starts_with("<!--") {
                let end = rest
                    .find("-->")
                    .ok_or(MarkupError::UnterminatedComment { offset: self.pos })?;
                self.pos += end + 3;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                let end = rest
                    .find('>')
                    .ok_or(MarkupError::UnterminatedTag { offset: self.pos })?;
                self.pos += end + 1;
            } else if rest.starts_with("</") {
                self.close_tag()?;
            } else if rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                self.open_tag()?;
            } else {
                self.push_text("<");
                self.pos += 1;
            }
        }
        Ok(self.roots)
    }

    fn open_tag(&mut self) -> Result<(), MarkupError> {
        let input = self.input;
        let start = self.pos;
        self.pos += 1;
        let name = self.read_name();
        let element = Element::new(&name);

        let self_closing = loop {
            self.skip_whitespace();
            let rest = &input[self.pos..];
            if rest.is_empty() {
                return Err(MarkupError::UnterminatedTag { offset: start });
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                break true;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break false;
            }
            if rest.starts_with('/') {
                self.pos += 1;
                continue;
            }
            let attr_name = self.read_name();
            if attr_name.is_empty() {
                // Skip one unexpected character to guarantee progress.
                self.pos += rest.chars().next().map(char::len_utf8).unwrap_or(1);
                continue;
            }
            self.skip_whitespace();
            let value = if input[self.pos..].starts_with('=') {
                self.pos += 1;
                self.skip_whitespace();
                self.read_attribute_value(start)?
            } else {
                String::new()
            };
            element.set_attribute(&attr_name, &value);
        };

        let tag = element.tag().to_string();
        self.attach(Node::Element(element.clone()));

        if self_closing || is_void_element(&tag) {
            return Ok(());
        }
        if is_raw_text_element(&tag) {
            let rest = &input[self.pos..];
            let closing = format!("</{tag}");
            let end = rest
                .to_ascii_lowercase()
                .find(&closing)
                .ok_or(MarkupError::UnterminatedRawText {
                    tag: tag.clone(),
                    offset: start,
                })?;
            if end > 0 {
                element.push_node_silent(Node::Text(rest[..end].to_string()));
            }
            self.pos += end;
            let tail = &input[self.pos..];
            let gt = tail
                .find('>')
                .ok_or(MarkupError::UnterminatedTag { offset: self.pos })?;
            self.pos += gt + 1;
            return Ok(());
        }

        self.open.push(element);
        Ok(())
    }

    fn close_tag(&mut self) -> Result<(), MarkupError> {
        let input = self.input;
        let start = self.pos;
        self.pos += 2;
        let name = self.read_name().to_ascii_lowercase();
        let rest = &input[self.pos..];
        let gt = rest
            .find('>')
            .ok_or(MarkupError::UnterminatedTag { offset: start })?;
        self.pos += gt + 1;

        if let Some(index) = self.open.iter().rposition(|el| el.tag() == name) {
            self.open.truncate(index);
        }
        Ok(())
    }

    fn read_name(&mut self) -> String {
        let input = self.input;
        let rest = &input[self.pos..];
        let len = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '>' | '/' | '=' | '"' | '\''))
            .unwrap_or(rest.len());
        self.pos += len;
        rest[..len].to_string()
    }

    fn read_attribute_value(&mut self, tag_start: usize) -> Result<String, MarkupError> {
        let input = self.input;
        let rest = &input[self.pos..];
        match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &rest[1..];
                let end = body
                    .find(quote)
                    .ok_or(MarkupError::UnterminatedTag { offset: tag_start })?;
                self.pos += end + 2;
                Ok(decode_attribute(&body[..end]))
            }
            _ => {
                let len = rest
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                self.pos += len;
                Ok(decode_attribute(&rest[..len]))
            }
        }
    }

    fn skip_whitespace(&mut self) {
        let input = self.input;
        let rest = &input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.attach(Node::Text(text.to_string()));
    }

    fn attach(&mut self, node: Node) {
        match self.open.last() {
            Some(parent) => parent.push_node_silent(node),
            None => self.roots.push(node),
        }
    }
}

fn decode_attribute(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
