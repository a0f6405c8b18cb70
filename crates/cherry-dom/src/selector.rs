//! # Selectors
//!
//! A small CSS selector engine: selector lists, descendant and child
//! combinators, and compound selectors made of `*`, type, `#id`, `.class`,
//! `[attr]` and `[attr=value]`.

use std::rc::Rc;

use crate::{DomError, Node};

/// Relationship between two compound selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    /// `a b`
    Descendant,
    /// `a > b`
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    value: Option<String>,
}

/// A sequence of simple selectors with no combinator, e.g. `button.primary[disabled]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

impl Compound {
    fn matches(&self, node: &Node) -> bool {
        let Some(tag_name) = node.tag_name() else {
            return false;
        };
        if let Some(tag) = &self.tag {
            if !tag.eq_ignore_ascii_case(tag_name) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.get_attribute("id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| node.has_class(c)) {
            return false;
        }
        self.attrs.iter().all(|attr| match &attr.value {
            None => node.has_attribute(&attr.name),
            Some(value) => node.get_attribute(&attr.name).as_deref() == Some(value.as_str()),
        })
    }
}

/// Compounds left to right; `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

impl Complex {
    fn matches(&self, node: &Rc<Node>) -> bool {
        self.match_from(self.compounds.len() - 1, node)
    }

    fn match_from(&self, index: usize, node: &Rc<Node>) -> bool {
        if !self.compounds[index].matches(node) {
            return false;
        }
        if index == 0 {
            return true;
        }

        match self.combinators[index - 1] {
            Combinator::Child => node
                .parent()
                .map(|p| self.match_from(index - 1, &p))
                .unwrap_or(false),
            Combinator::Descendant => {
                let mut ancestor = node.parent();
                while let Some(a) = ancestor {
                    if self.match_from(index - 1, &a) {
                        return true;
                    }
                    ancestor = a.parent();
                }
                false
            }
        }
    }
}

/// A parsed, comma separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    selectors: Vec<Complex>,
}

impl SelectorList {
    /// Parse a selector list.
    pub fn parse(input: &str) -> Result<Self, DomError> {
        Parser::new(input).parse_list()
    }

    /// Whether an element matches any selector in the list.
    pub fn matches(&self, node: &Rc<Node>) -> bool {
        self.selectors.iter().any(|s| s.matches(node))
    }

    /// Descendants of `scope` matching the list, in document order.
    pub fn select_all(&self, scope: &Node) -> Vec<Rc<Node>> {
        let mut found = Vec::new();
        scope.for_each_descendant(&mut |n: &Rc<Node>| {
            if self.matches(n) {
                found.push(n.clone());
            }
        });
        found
    }

    /// First descendant of `scope` matching the list.
    pub fn select_first(&self, scope: &Node) -> Option<Rc<Node>> {
        fn walk(list: &SelectorList, node: &Node) -> Option<Rc<Node>> {
            for child in node.children() {
                if list.matches(&child) {
                    return Some(child);
                }
                if let Some(found) = walk(list, &child) {
                    return Some(found);
                }
            }
            None
        }
        walk(self, scope)
    }
}

impl Node {
    /// Whether this element matches a selector.
    pub fn matches(self: &Rc<Self>, selector: &str) -> Result<bool, DomError> {
        Ok(SelectorList::parse(selector)?.matches(self))
    }

    /// First descendant matching a selector.
    pub fn query_selector(&self, selector: &str) -> Result<Option<Rc<Node>>, DomError> {
        Ok(SelectorList::parse(selector)?.select_first(self))
    }

    /// All descendants matching a selector, in document order.
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<Rc<Node>>, DomError> {
        Ok(SelectorList::parse(selector)?.select_all(self))
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> DomError {
        DomError::InvalidSelector {
            selector: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Returns true if any whitespace was consumed.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(mut self) -> Result<SelectorList, DomError> {
        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            selectors.push(self.parse_complex()?);
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(',') => self.pos += 1,
                Some(c) => return Err(self.error(format!("unexpected {c:?}"))),
            }
        }
        Ok(SelectorList { selectors })
    }

    fn parse_complex(&mut self) -> Result<Complex, DomError> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();

        loop {
            let had_whitespace = self.skip_whitespace();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    combinators.push(Combinator::Child);
                }
                Some(_) if had_whitespace => combinators.push(Combinator::Descendant),
                Some(c) => return Err(self.error(format!("unexpected {c:?}"))),
            }
            compounds.push(self.parse_compound()?);
        }

        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound, DomError> {
        let mut compound = Compound::default();
        let start = self.pos;

        match self.peek() {
            Some('*') => self.pos += 1,
            Some(c) if is_ident_char(c) => compound.tag = Some(self.parse_ident()?),
            _ => {}
        }

        while let Some(c) = self.peek() {
            match c {
                '#' => {
                    self.pos += 1;
                    compound.id = Some(self.parse_ident()?);
                }
                '.' => {
                    self.pos += 1;
                    compound.classes.push(self.parse_ident()?);
                }
                '[' => {
                    self.pos += 1;
                    compound.attrs.push(self.parse_attr()?);
                }
                _ => break,
            }
        }

        if self.pos == start {
            return Err(match self.peek() {
                Some(c) => self.error(format!("expected a selector, found {c:?}")),
                None => self.error("expected a selector"),
            });
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String, DomError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected an identifier"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_attr(&mut self) -> Result<AttrSelector, DomError> {
        self.skip_whitespace();
        let name = self.parse_ident()?;
        self.skip_whitespace();

        let value = match self.peek() {
            Some(']') => None,
            Some('=') => {
                self.pos += 1;
                self.skip_whitespace();
                let value = match self.peek() {
                    Some(quote @ ('"' | '\'')) => {
                        self.pos += 1;
                        let start = self.pos;
                        while self.peek().is_some_and(|c| c != quote) {
                            self.pos += 1;
                        }
                        if self.peek().is_none() {
                            return Err(self.error("unterminated string"));
                        }
                        let value: String = self.chars[start..self.pos].iter().collect();
                        self.pos += 1;
                        value
                    }
                    _ => self.parse_ident()?,
                };
                self.skip_whitespace();
                Some(value)
            }
            _ => return Err(self.error("malformed attribute selector")),
        };

        if self.peek() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        self.pos += 1;
        Ok(AttrSelector { name, value })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}
