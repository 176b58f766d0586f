//! Property expressions
//!
//! The boolean language used by expression rules and `@if(...)` guards.
//! Expressions are evaluated against an [`EntryProps`] bag; a predicate on a
//! property the entry does not carry is simply false.

use std::fmt;

use once_cell::sync::OnceCell;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use sg_core::EntryProps;

use crate::error::SyntaxError;

// =============================================================================
// Expression Tree
// =============================================================================

/// Compiled expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Compare {
        prop: String,
        op: StringOp,
        /// Lowercased when `ignore_case` is set.
        value: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        ignore_case: bool,
    },
    Matches {
        prop: String,
        regex: LazyRegex,
    },
}

impl Expression {
    pub fn compare(prop: impl Into<String>, op: StringOp, value: &str, ignore_case: bool) -> Self {
        let value = if ignore_case { value.to_lowercase() } else { value.to_string() };
        Self::Compare {
            prop: prop.into(),
            op,
            value,
            ignore_case,
        }
    }

    /// Evaluate with short-circuiting `&` and `|`.
    pub fn evaluate(&self, props: &EntryProps) -> bool {
        match self {
            Self::Not(inner) => !inner.evaluate(props),
            Self::And(lhs, rhs) => lhs.evaluate(props) && rhs.evaluate(props),
            Self::Or(lhs, rhs) => lhs.evaluate(props) || rhs.evaluate(props),
            Self::Compare { prop, op, value, ignore_case } => match props.get(prop) {
                Some(actual) if *ignore_case => op.apply(&actual.to_lowercase(), value),
                Some(actual) => op.apply(actual, value),
                None => false,
            },
            Self::Matches { prop, regex } => props.get(prop).is_some_and(|actual| regex.is_match(actual)),
        }
    }
}

/// String comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringOp {
    /// `=`
    Equals,
    /// `^=`
    StartsWith,
    /// `$=`
    EndsWith,
    /// `*=`
    Contains,
}

impl StringOp {
    #[inline]
    fn apply(self, actual: &str, expected: &str) -> bool {
        match self {
            Self::Equals => actual == expected,
            Self::StartsWith => actual.starts_with(expected),
            Self::EndsWith => actual.ends_with(expected),
            Self::Contains => actual.contains(expected),
        }
    }
}

// =============================================================================
// Regular Expressions
// =============================================================================

bitflags::bitflags! {
    /// Flags accepted after a `/pattern/`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RegexFlags: u8 {
        /// `i`
        const IGNORE_CASE = 1 << 0;
        /// `m`
        const MULTI_LINE = 1 << 1;
        /// `s`
        const DOT_ALL = 1 << 2;
        /// `u` - accepted, Unicode mode is always on
        const UNICODE = 1 << 3;
        /// `g` - accepted, no effect on matching
        const GLOBAL = 1 << 4;
        /// `y` - accepted, no effect on matching
        const STICKY = 1 << 5;
    }
}

impl RegexFlags {
    const LETTERS: [(char, RegexFlags); 6] = [
        ('i', Self::IGNORE_CASE),
        ('m', Self::MULTI_LINE),
        ('s', Self::DOT_ALL),
        ('u', Self::UNICODE),
        ('g', Self::GLOBAL),
        ('y', Self::STICKY),
    ];

    pub fn from_letter(letter: char) -> Option<Self> {
        Self::LETTERS.iter().find(|(c, _)| *c == letter).map(|(_, flag)| *flag)
    }

    pub fn parse(letters: &str) -> Result<Self, SyntaxError> {
        letters.chars().try_fold(Self::empty(), |flags, letter| {
            Self::from_letter(letter)
                .map(|flag| flags | flag)
                .ok_or(SyntaxError::InvalidRegexFlag(letter))
        })
    }
}

impl fmt::Display for RegexFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (letter, flag) in Self::LETTERS {
            if self.contains(flag) {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

/// A regular expression validated at compile time and built on first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RegexRepr", into = "RegexRepr")]
pub struct LazyRegex {
    source: String,
    flags: RegexFlags,
    compiled: OnceCell<Option<Regex>>,
}

impl PartialEq for LazyRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

impl LazyRegex {
    /// Validate `source` (JS-style, `\/` allowed) without building the automaton.
    pub fn new(source: &str, flags: RegexFlags) -> Result<Self, SyntaxError> {
        let source = unescape_slashes(source);
        regex_syntax::ParserBuilder::new()
            .case_insensitive(flags.contains(RegexFlags::IGNORE_CASE))
            .multi_line(flags.contains(RegexFlags::MULTI_LINE))
            .dot_matches_new_line(flags.contains(RegexFlags::DOT_ALL))
            .build()
            .parse(&source)
            .map_err(|e| SyntaxError::InvalidRegex(e.to_string()))?;

        Ok(Self {
            source,
            flags,
            compiled: OnceCell::new(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn flags(&self) -> RegexFlags {
        self.flags
    }

    /// True once the automaton has been built.
    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.compiled
            .get_or_init(|| self.build())
            .as_ref()
            .is_some_and(|regex| regex.is_match(haystack))
    }

    fn build(&self) -> Option<Regex> {
        RegexBuilder::new(&self.source)
            .case_insensitive(self.flags.contains(RegexFlags::IGNORE_CASE))
            .multi_line(self.flags.contains(RegexFlags::MULTI_LINE))
            .dot_matches_new_line(self.flags.contains(RegexFlags::DOT_ALL))
            .build()
            .map_err(|e| log::warn!("regex /{}/ failed to build: {}", self.source, e))
            .ok()
    }
}

/// `\/` is how a slash is written inside `/.../`; the regex crate wants a bare `/`.
fn unescape_slashes(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('/') => out.push('/'),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Serialized form of a [`LazyRegex`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegexRepr {
    source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    flags: String,
}

impl TryFrom<RegexRepr> for LazyRegex {
    type Error = SyntaxError;

    fn try_from(repr: RegexRepr) -> Result<Self, Self::Error> {
        LazyRegex::new(&repr.source, RegexFlags::parse(&repr.flags)?)
    }
}

impl From<LazyRegex> for RegexRepr {
    fn from(regex: LazyRegex) -> Self {
        Self {
            source: regex.source,
            flags: regex.flags.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> EntryProps {
        EntryProps::new("https://www.example.com/news/today").with("title", "Breaking NEWS today")
    }

    #[test]
    fn test_string_ops() {
        let props = props();
        assert!(Expression::compare("url", StringOp::StartsWith, "https://www.", false).evaluate(&props));
        assert!(Expression::compare("url", StringOp::EndsWith, "/today", false).evaluate(&props));
        assert!(Expression::compare("title", StringOp::Contains, "NEWS", false).evaluate(&props));
        assert!(!Expression::compare("title", StringOp::Contains, "news", false).evaluate(&props));
        assert!(Expression::compare("title", StringOp::Contains, "News", true).evaluate(&props));
        assert!(Expression::compare("title", StringOp::Equals, "breaking news TODAY", true).evaluate(&props));
        assert!(!Expression::compare("title", StringOp::Equals, "Breaking", false).evaluate(&props));
    }

    #[test]
    fn test_missing_property_is_false() {
        let props = props();
        let missing = Expression::compare("snippet", StringOp::Contains, "", false);
        assert!(!missing.evaluate(&props));
        assert!(Expression::Not(Box::new(missing)).evaluate(&props));
    }

    #[test]
    fn test_combinators() {
        let props = props();
        let yes = || Box::new(Expression::compare("title", StringOp::Contains, "today", false));
        let no = || Box::new(Expression::compare("title", StringOp::Contains, "tomorrow", false));
        assert!(Expression::Or(no(), yes()).evaluate(&props));
        assert!(!Expression::And(yes(), no()).evaluate(&props));
        assert!(Expression::And(yes(), Box::new(Expression::Not(no()))).evaluate(&props));
    }

    #[test]
    fn test_regex_is_lazy() {
        let regex = LazyRegex::new(r"example\.(com|net)", RegexFlags::empty()).unwrap();
        assert!(!regex.is_compiled());
        assert!(regex.is_match("https://example.com/"));
        assert!(regex.is_compiled());
        assert!(!regex.is_match("https://example.org/"));
    }

    #[test]
    fn test_regex_flags() {
        let regex = LazyRegex::new("EXAMPLE", RegexFlags::parse("i").unwrap()).unwrap();
        assert!(regex.is_match("example"));
        assert_eq!(RegexFlags::parse("gimsuy").unwrap().to_string(), "imsugy");
        assert_eq!(RegexFlags::parse("x"), Err(SyntaxError::InvalidRegexFlag('x')));
    }

    #[test]
    fn test_invalid_regex() {
        assert!(matches!(LazyRegex::new(r"example\.(net|org", RegexFlags::empty()), Err(SyntaxError::InvalidRegex(_))));
    }

    #[test]
    fn test_escaped_slash() {
        let regex = LazyRegex::new(r"^https:\/\/example\.com\/", RegexFlags::empty()).unwrap();
        assert_eq!(regex.source(), r"^https://example\.com/");
        assert!(regex.is_match("https://example.com/"));
    }

    #[test]
    fn test_serde_round_trip() {
        let expression = Expression::Or(
            Box::new(Expression::compare("title", StringOp::Equals, "Spam", true)),
            Box::new(Expression::Matches {
                prop: "url".to_string(),
                regex: LazyRegex::new("spam", RegexFlags::IGNORE_CASE).unwrap(),
            }),
        );
        let json = serde_json::to_string(&expression).unwrap();
        let restored: Expression = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, expression);
        assert!(restored.evaluate(&EntryProps::new("https://SPAM.example/")));
    }
}
