//! Validation of the restricted selector language rules may use.
//!
//! Only comma-separated lists of single class or ID selectors are accepted
//! (`.btn`, `#cta, .nav-link`). Anything richer is rejected so a rule can never
//! reach into arbitrary page structure.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

fn grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        Regex::new(r"^[#.][A-Za-z0-9_-]+(\s*,\s*[#.][A-Za-z0-9_-]+)*$").expect("selector grammar is a valid regex")
    })
}

/// One simple selector out of a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimpleSelector {
    Class(String),
    Id(String),
}

impl fmt::Display for SimpleSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimpleSelector::Class(name) => write!(f, ".{name}"),
            SimpleSelector::Id(name) => write!(f, "#{name}"),
        }
    }
}

/// A validated class/ID selector list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassIdSelector {
    parts: Vec<SimpleSelector>,
}

impl ClassIdSelector {
    /// Parse a selector list. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if !grammar().is_match(input) {
            return None;
        }
        let parts = input
            .split(',')
            .map(str::trim)
            .map(|part| {
                let (sigil, name) = part.split_at(1);
                if sigil == "#" {
                    SimpleSelector::Id(name.to_string())
                } else {
                    SimpleSelector::Class(name.to_string())
                }
            })
            .collect();
        Some(Self { parts })
    }

    pub fn is_valid(input: &str) -> bool {
        grammar().is_match(input.trim())
    }

    pub fn parts(&self) -> &[SimpleSelector] {
        &self.parts
    }

    /// Whether an element with this id and these classes matches any part.
    pub fn matches(&self, id: Option<&str>, classes: &[&str]) -> bool {
        self.parts.iter().any(|part| match part {
            SimpleSelector::Class(name) => classes.iter().any(|c| c == name),
            SimpleSelector::Id(name) => id == Some(name.as_str()),
        })
    }
}

/// Canonical `a, b` rendering, safe to hand to `querySelectorAll`.
impl fmt::Display for ClassIdSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}
