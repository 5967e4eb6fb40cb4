//! Ordered regex pattern tables
//!
//! A [`Patterns`] table is a list of `(regex, label)` rules searched in order;
//! the first rule whose regex matches anywhere in the input wins. When nothing
//! matches, the table hands back the fallback value it was built with.
//!
//! Tables are compiled eagerly and are immutable afterwards, so a single
//! table can be shared between threads without locking.

use regex::Regex;
use std::collections::HashMap;

use crate::error::ConfigurationError;

/// Outcome of a successful rule match: the rule's label plus every named
/// capture group that participated in the match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolved {
    pub label: String,
    pub captures: HashMap<String, String>,
}

impl Resolved {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            captures: HashMap::new(),
        }
    }

    pub fn capture(&self, name: &str) -> Option<&str> {
        self.captures.get(name).map(String::as_str)
    }
}

/// Source form of a rule, before compilation.
#[derive(Debug, Clone)]
pub struct PatternSpec {
    pub regex: String,
    pub label: String,
}

impl From<&str> for PatternSpec {
    fn from(regex: &str) -> Self {
        Self {
            regex: regex.to_string(),
            label: String::new(),
        }
    }
}

impl From<String> for PatternSpec {
    fn from(regex: String) -> Self {
        Self {
            regex,
            label: String::new(),
        }
    }
}

impl From<(&str, &str)> for PatternSpec {
    fn from((regex, label): (&str, &str)) -> Self {
        Self {
            regex: regex.to_string(),
            label: label.to_string(),
        }
    }
}

/// A single compiled rule.
#[derive(Debug, Clone)]
pub struct RegexPattern {
    regex: Regex,
    label: String,
}

impl RegexPattern {
    pub fn new(regex: &str, label: impl Into<String>) -> Result<Self, ConfigurationError> {
        let regex = Regex::new(regex).map_err(|source| ConfigurationError::InvalidPattern {
            pattern: regex.to_string(),
            source,
        })?;

        Ok(Self {
            regex,
            label: label.into(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Search `input` for the pattern. Groups that did not take part in the
    /// match are left out of the capture map.
    pub fn resolve(&self, input: &str) -> Option<Resolved> {
        let caps = self.regex.captures(input)?;

        let captures = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();

        Some(Resolved {
            label: self.label.clone(),
            captures,
        })
    }
}

/// Anything that maps an input string to some output value.
///
/// [`Patterns`] is the production implementation; the seam exists so that
/// classifiers can be driven by other resolvers.
pub trait Resolve: Send + Sync {
    type Output;

    fn resolve(&self, input: &str) -> Self::Output;
}

/// Ordered table of rules with a fallback value `U`.
///
/// `U` is whatever the caller wants back for "no match": a
/// `Resolved { label: "Unknown", .. }` for browser detection, `None` for
/// search engines and ignore lists.
#[derive(Debug, Clone)]
pub struct Patterns<U> {
    rules: Vec<RegexPattern>,
    unknown: U,
}

impl<U> Patterns<U> {
    /// Compile every rule up front. An invalid regex fails the whole table.
    pub fn new<I, P>(unknown: U, rules: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PatternSpec>,
    {
        let rules = rules
            .into_iter()
            .map(|spec| {
                let spec = spec.into();
                RegexPattern::new(&spec.regex, spec.label)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules, unknown })
    }

    /// First matching rule, if any.
    pub fn find(&self, input: &str) -> Option<Resolved> {
        self.rules.iter().find_map(|rule| rule.resolve(input))
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.rules.iter().any(|rule| rule.regex.is_match(input))
    }

    pub fn unknown(&self) -> &U {
        &self.unknown
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<U> Patterns<U>
where
    U: Clone + From<Resolved>,
{
    /// Resolve `input` to the first matching rule, or the fallback verbatim.
    pub fn resolve(&self, input: &str) -> U {
        match self.find(input) {
            Some(resolved) => U::from(resolved),
            None => self.unknown.clone(),
        }
    }
}

impl<U> Resolve for Patterns<U>
where
    U: Clone + From<Resolved> + Send + Sync,
{
    type Output = U;

    fn resolve(&self, input: &str) -> U {
        Patterns::resolve(self, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_pattern_resolve() {
        let pat = RegexPattern::new(r"^foo$", "bar").unwrap();
        let resolved = pat.resolve("foo").unwrap();
        assert_eq!(resolved.label, "bar");
        assert!(resolved.captures.is_empty());
    }

    #[test]
    fn test_regex_pattern_resolve_with_group() {
        let pat = RegexPattern::new(r"^foo(?P<id>\d*)$", "bar").unwrap();
        let resolved = pat.resolve("foo1").unwrap();
        assert_eq!(resolved.label, "bar");
        assert_eq!(resolved.capture("id"), Some("1"));
    }

    #[test]
    fn test_regex_pattern_cant_resolve() {
        let pat = RegexPattern::new(r"^foo$", "bar").unwrap();
        assert!(pat.resolve("bar").is_none());
    }

    #[test]
    fn test_unmatched_groups_are_omitted() {
        let pat = RegexPattern::new(r"Firefox(/(?P<version>[-.\w]+)?)", "Firefox").unwrap();
        let resolved = pat.resolve("Mozilla Firefox/ (X11)").unwrap();
        assert!(!resolved.captures.contains_key("version"));

        let resolved = pat.resolve("Firefox/3.5").unwrap();
        assert_eq!(resolved.capture("version"), Some("3.5"));
    }

    #[test]
    fn test_search_is_not_anchored() {
        let pat = RegexPattern::new(r"Googlebot", "Google").unwrap();
        assert!(pat.resolve("Mozilla/5.0 (compatible; Googlebot/2.1)").is_some());
    }

    #[test]
    fn test_bare_regex_gets_empty_label() {
        let pats: Patterns<Option<Resolved>> =
            Patterns::new(None, [r"^foo$", r"^bar$"]).unwrap();
        assert_eq!(pats.resolve("foo"), Some(Resolved::new("")));
    }

    #[test]
    fn test_fallback_is_returned_verbatim() {
        let fallback = Resolved::new("^foobar$");
        let pats = Patterns::new(fallback.clone(), [r"^foo$", r"^bar$"]).unwrap();
        assert_eq!(pats.resolve("barfoo"), fallback);
    }

    #[test]
    fn test_first_match_wins() {
        let pats: Patterns<Option<Resolved>> =
            Patterns::new(None, [(r"Chrome/", "Google Chrome"), (r"Safari/", "Safari")]).unwrap();
        let ua = "Mozilla/5.0 AppleWebKit/537.36 Chrome/120.0 Safari/537.36";
        assert_eq!(pats.resolve(ua).unwrap().label, "Google Chrome");

        let reordered: Patterns<Option<Resolved>> =
            Patterns::new(None, [(r"Safari/", "Safari"), (r"Chrome/", "Google Chrome")]).unwrap();
        assert_eq!(reordered.resolve(ua).unwrap().label, "Safari");
    }

    #[test]
    fn test_invalid_regex_fails_at_construction() {
        let result: Result<Patterns<Option<Resolved>>, _> = Patterns::new(None, [r"ok", r"(unclosed"]);
        match result {
            Err(ConfigurationError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
            other => panic!("expected InvalidPattern, got {:?}", other),
        }
    }

    #[test]
    fn test_unicode_input() {
        let pats: Patterns<Option<Resolved>> =
            Patterns::new(None, [(r"(?P<word>\w+)bot", "bot")]).unwrap();
        let resolved = pats.resolve("Ünïcödebot/1.0").unwrap();
        assert_eq!(resolved.capture("word"), Some("Ünïcöde"));
    }

    #[test]
    fn test_is_match() {
        let pats: Patterns<Option<Resolved>> = Patterns::new(None, [r"^admin/", r"^static/"]).unwrap();
        assert!(pats.is_match("static/app.css"));
        assert!(!pats.is_match("blog/static/"));
    }
}
