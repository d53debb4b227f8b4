//! String templates with `{locator}` references.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use vaultdump_common::{Error, Locator, Node, Result, ResultTree};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Reference(Locator),
}

/// A parsed template such as `postgres://{db.user}@host`.
///
/// `{{` and `}}` stand for literal braces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Template {
    raw: String,
    parts: Vec<Part>,
}

impl Template {
    /// Parse a template string.
    ///
    /// # Errors
    /// - `InvalidInput` on an unclosed `{` or an invalid reference
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut reference = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => reference.push(ch),
                            None => {
                                return Err(Error::InvalidInput(format!(
                                    "Unclosed '{{' in template '{raw}'"
                                )))
                            }
                        }
                    }
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(Part::Reference(Locator::parse(&reference)?));
                }
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    /// The locators this template reads.
    pub fn references(&self) -> impl Iterator<Item = &Locator> {
        self.parts.iter().filter_map(|part| match part {
            Part::Reference(locator) => Some(locator),
            Part::Literal(_) => None,
        })
    }

    /// Substitute the current values of all references.
    ///
    /// Missing references render as the empty string.
    ///
    /// # Errors
    /// - `ShapeMismatch` if a reference descends into a non-mapping value
    pub fn render(&self, document: &ResultTree) -> Result<String> {
        let mut out = String::with_capacity(self.raw.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Reference(locator) => {
                    if let Some(node) = document.get_at(locator.segments())? {
                        out.push_str(&render_node(node));
                    }
                }
            }
        }
        Ok(out)
    }
}

fn render_node(node: &Node) -> String {
    match node {
        Node::Value(Value::String(s)) => s.clone(),
        Node::Value(Value::Null) => String::new(),
        Node::Value(other) => other.to_string(),
        Node::Tree(tree) => tree.to_value().to_string(),
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl TryFrom<String> for Template {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        template.raw
    }
}
