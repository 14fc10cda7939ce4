//! Rule-level CSS parser.
//!
//! Splits a style block into top-level rules without interpreting
//! declarations. Conditional group rules (`@media`, `@supports`) are parsed
//! recursively; every other at-rule is captured verbatim.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// One parsed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssRule {
    /// `selector { declarations }`.
    Style {
        selector: String,
        declarations: String,
    },
    /// `@media`/`@supports` with nested rules.
    Conditional {
        kind: ConditionKind,
        condition: String,
        rules: Vec<CssRule>,
    },
    /// Rules copied as-is: imports, font-face, page, keyframes and unknown
    /// at-rules.
    Verbatim(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    Media,
    Supports,
}

impl ConditionKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Media => "@media",
            Self::Supports => "@supports",
        }
    }
}

impl CssRule {
    /// Serializes the rule back to text.
    pub fn to_css(&self) -> String {
        match self {
            Self::Style {
                selector,
                declarations,
            } => {
                if declarations.is_empty() {
                    format!("{selector} {{ }}")
                } else {
                    format!("{selector} {{ {declarations} }}")
                }
            }
            Self::Conditional {
                kind,
                condition,
                rules,
            } => {
                let nested = rules.iter().map(CssRule::to_css).collect::<Vec<_>>();
                format!("{} {condition} {{ {} }}", kind.keyword(), nested.join(" "))
            }
            Self::Verbatim(text) => text.clone(),
        }
    }
}

/// Serializes a rule list, one top-level rule per line. Every block is
/// written as `head { body }`; rules nested in a conditional share its line.
pub fn serialize_rules(rules: &[CssRule]) -> String {
    rules
        .iter()
        .map(CssRule::to_css)
        .collect::<Vec<_>>()
        .join("\n")
}

/// CSS parse errors. Offsets are byte positions in comment-stripped input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssParseError {
    UnclosedBlock { offset: usize },
    UnclosedString { offset: usize },
    UnclosedComment { offset: usize },
    MissingBlock { offset: usize },
    UnexpectedCloseBrace { offset: usize },
}

impl Display for CssParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnclosedBlock { offset } => write!(f, "unclosed block at byte {offset}"),
            Self::UnclosedString { offset } => write!(f, "unclosed string at byte {offset}"),
            Self::UnclosedComment { offset } => write!(f, "unclosed comment at byte {offset}"),
            Self::MissingBlock { offset } => {
                write!(f, "rule without declaration block at byte {offset}")
            }
            Self::UnexpectedCloseBrace { offset } => {
                write!(f, "unexpected `}}` at byte {offset}")
            }
        }
    }
}

impl Error for CssParseError {}

/// Parses a style block into top-level rules.
pub fn parse_rules(input: &str) -> Result<Vec<CssRule>, CssParseError> {
    let stripped = strip_comments(input)?;
    let mut parser = RuleParser::new(&stripped);
    let rules = parser.parse_list(false)?;
    Ok(rules)
}

fn strip_comments(input: &str) -> Result<String, CssParseError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    let mut quote: Option<char> = None;
    while let Some((index, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c == '/' && matches!(chars.peek(), Some((_, '*'))) {
            let end = input[index + 2..]
                .find("*/")
                .ok_or(CssParseError::UnclosedComment { offset: index })?;
            let resume = index + 2 + end + 2;
            while matches!(chars.peek(), Some((i, _)) if *i < resume) {
                chars.next();
            }
            continue;
        }
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
        out.push(c);
    }
    Ok(out)
}

struct RuleParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> RuleParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Parses rules until end of input or, when `nested`, a closing brace.
    fn parse_list(&mut self, nested: bool) -> Result<Vec<CssRule>, CssParseError> {
        let mut rules = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None if nested => return Err(CssParseError::UnclosedBlock { offset: self.pos }),
                None => return Ok(rules),
                Some('}') if nested => {
                    self.pos += 1;
                    return Ok(rules);
                }
                Some('}') => {
                    return Err(CssParseError::UnexpectedCloseBrace { offset: self.pos })
                }
                Some('@') => rules.push(self.parse_at_rule()?),
                Some(_) => rules.push(self.parse_style_rule()?),
            }
        }
    }

    fn parse_at_rule(&mut self) -> Result<CssRule, CssParseError> {
        let input = self.input;
        let start = self.pos;
        self.pos += 1;
        let name_len = input[self.pos..]
            .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(input.len() - self.pos);
        let name = input[self.pos..self.pos + name_len].to_ascii_lowercase();
        self.pos += name_len;

        let prelude_start = self.pos;
        let terminator = self.scan_prelude()?;
        let prelude = input[prelude_start..self.pos].trim().to_string();

        match terminator {
            Some(';') | None => {
                if terminator.is_some() {
                    self.pos += 1;
                }
                Ok(CssRule::Verbatim(input[start..self.pos].trim().to_string()))
            }
            Some(_) => {
                let kind = match name.as_str() {
                    "media" => Some(ConditionKind::Media),
                    "supports" => Some(ConditionKind::Supports),
                    _ => None,
                };
                match kind {
                    Some(kind) => {
                        self.pos += 1;
                        let rules = self.parse_list(true)?;
                        Ok(CssRule::Conditional {
                            kind,
                            condition: prelude,
                            rules,
                        })
                    }
                    None => {
                        self.skip_block()?;
                        Ok(CssRule::Verbatim(input[start..self.pos].trim().to_string()))
                    }
                }
            }
        }
    }

    fn parse_style_rule(&mut self) -> Result<CssRule, CssParseError> {
        let input = self.input;
        let start = self.pos;
        match self.scan_prelude()? {
            Some('{') => {}
            _ => return Err(CssParseError::MissingBlock { offset: start }),
        }
        let selector = input[start..self.pos].trim().to_string();
        let body_start = self.pos + 1;
        self.skip_block()?;
        let declarations = input[body_start..self.pos - 1].trim().to_string();
        Ok(CssRule::Style {
            selector,
            declarations,
        })
    }

    /// Advances to the next top-level `{` or `;` (not consumed) and returns
    /// it, or `None` at end of input. Strings, brackets and parens are
    /// skipped as units.
    fn scan_prelude(&mut self) -> Result<Option<char>, CssParseError> {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '"' | '\'' => self.skip_string(c)?,
                '(' | '[' => {
                    depth += 1;
                    self.pos += 1;
                }
                ')' | ']' => {
                    depth = depth.saturating_sub(1);
                    self.pos += 1;
                }
                '{' | ';' if depth == 0 => return Ok(Some(c)),
                '}' if depth == 0 => return Err(CssParseError::MissingBlock { offset: self.pos }),
                _ => self.pos += c.len_utf8(),
            }
        }
        Ok(None)
    }

    /// Consumes a balanced `{ ... }` block starting at the current `{`.
    fn skip_block(&mut self) -> Result<(), CssParseError> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '"' | '\'' => {
                    self.skip_string(c)?;
                    continue;
                }
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return Ok(());
                    }
                }
                _ => {}
            }
            self.pos += c.len_utf8();
        }
        Err(CssParseError::UnclosedBlock { offset: start })
    }

    fn skip_string(&mut self, quote: char) -> Result<(), CssParseError> {
        let start = self.pos;
        self.pos += 1;
        while let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            if c == '\\' {
                if let Some(escaped) = self.peek() {
                    self.pos += escaped.len_utf8();
                }
            } else if c == quote {
                return Ok(());
            }
        }
        Err(CssParseError::UnclosedString { offset: start })
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }
}
