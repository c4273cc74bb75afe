//! URL patterns used by transition rules.
//!
//! Two forms are supported:
//! - wildcard: `*` matches any run of characters, everything else is literal,
//!   and the whole location must match (`*/shop/*`);
//! - regex: a `regex:` prefix, the remainder compiled as-is and searched
//!   anywhere in the location (`regex:.*\.pdf$`).

use regex::Regex;

/// Prefix marking an explicit regular expression.
pub const REGEX_PREFIX: &str = "regex:";

/// A compiled transition URL pattern.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    source: String,
    regex: Regex,
}

impl UrlPattern {
    /// Compile a pattern. Fails only for malformed `regex:` patterns.
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let regex = match pattern.strip_prefix(REGEX_PREFIX) {
            Some(expr) => Regex::new(expr)?,
            None => Regex::new(&wildcard_to_regex(pattern))?,
        };
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_regex(&self) -> bool {
        self.source.starts_with(REGEX_PREFIX)
    }

    pub fn matches(&self, location: &str) -> bool {
        self.regex.is_match(location)
    }

    /// One-shot match; a pattern that fails to compile matches nothing.
    pub fn matches_str(pattern: &str, location: &str) -> bool {
        Self::compile(pattern)
            .map(|p| p.matches(location))
            .unwrap_or(false)
    }
}

/// Anchored regex source for a wildcard pattern.
pub fn wildcard_to_regex(pattern: &str) -> String {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{body}$")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_segments() {
        let p = UrlPattern::compile("*/shop/*").unwrap();
        assert!(p.matches("/shop/item/1"));
        assert!(p.matches("/en/shop/"));
        assert!(!p.matches("/blog/shop"));
        assert!(!p.is_regex());
    }

    #[test]
    fn test_wildcard_escapes_metacharacters() {
        let p = UrlPattern::compile("/search?q=*").unwrap();
        assert!(p.matches("/search?q=boots"));
        assert!(!p.matches("/searchXq=boots"));

        let dots = UrlPattern::compile("/file.html").unwrap();
        assert!(dots.matches("/file.html"));
        assert!(!dots.matches("/fileXhtml"));
    }

    #[test]
    fn test_wildcard_is_anchored() {
        let p = UrlPattern::compile("/about").unwrap();
        assert!(p.matches("/about"));
        assert!(!p.matches("/about/team"));
        assert!(!p.matches("/x/about"));
    }

    #[test]
    fn test_regex_patterns() {
        let p = UrlPattern::compile(r"regex:.*\.pdf$").unwrap();
        assert!(p.is_regex());
        assert!(p.matches("/files/report.pdf"));
        assert!(!p.matches("/files/report.pdf.html"));
    }

    #[test]
    fn test_invalid_regex_matches_nothing() {
        assert!(UrlPattern::compile("regex:(unclosed").is_err());
        assert!(!UrlPattern::matches_str("regex:(unclosed", "/anything"));
    }

    #[test]
    fn test_wildcard_to_regex_source() {
        assert_eq!(wildcard_to_regex("*/a.b/*"), r"^.*/a\.b/.*$");
    }
}
