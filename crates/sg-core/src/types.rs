//! Core type definitions for serpguard
//!
//! These types are shared by the pattern index, the rule compiler and the
//! ruleset layer, and most of them appear in serialized rulesets.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Specifiers (the "@" prefix of a rule line)
// =============================================================================

/// Qualifier attached to a rule. A rule without a specifier blocks.
///
/// Serialized as a single integer: `0` for [`Specifier::Negate`], `N` for
/// [`Specifier::Highlight`] with color `N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum Specifier {
    /// `@` - unblock
    Negate,
    /// `@N` - highlight with color N (N >= 1)
    Highlight(u32),
}

impl From<Specifier> for u32 {
    fn from(value: Specifier) -> Self {
        match value {
            Specifier::Negate => 0,
            Specifier::Highlight(color) => color,
        }
    }
}

impl TryFrom<u32> for Specifier {
    type Error = &'static str;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Negate,
            color => Self::Highlight(color),
        })
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negate => f.write_str("@"),
            Self::Highlight(color) => write!(f, "@{color}"),
        }
    }
}

// =============================================================================
// Decisions
// =============================================================================

/// Aggregated outcome for one search result.
///
/// The derived ordering is the priority order used for aggregation:
/// `Block < Unblock < Highlight(1) < Highlight(2) < ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Block,
    Unblock,
    Highlight(u32),
}

impl Decision {
    /// Outcome of a single rule with the given specifier.
    pub fn from_specifier(specifier: Option<Specifier>) -> Self {
        match specifier {
            None => Self::Block,
            Some(Specifier::Negate) => Self::Unblock,
            Some(Specifier::Highlight(color)) => Self::Highlight(color),
        }
    }

    /// Maximum outcome under the priority order, or `None` for no rules.
    pub fn aggregate<I>(specifiers: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<Specifier>>,
    {
        specifiers.into_iter().map(Self::from_specifier).max()
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block => f.write_str("block"),
            Self::Unblock => f.write_str("unblock"),
            Self::Highlight(color) => write!(f, "highlight({color})"),
        }
    }
}

// =============================================================================
// Rule Matches
// =============================================================================

/// One rule that fired for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleMatch {
    pub line_number: u32,
    pub specifier: Option<Specifier>,
}

impl RuleMatch {
    pub fn decision(&self) -> Decision {
        Decision::from_specifier(self.specifier)
    }

    /// A rule without a specifier.
    pub fn is_plain_block(&self) -> bool {
        self.specifier.is_none()
    }
}

// =============================================================================
// Entry Properties
// =============================================================================

/// Property bag describing one search result.
///
/// Always carries `url`; search engine adapters usually add `title`.
/// Values are opaque to the engine and only inspected by rule predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryProps {
    props: BTreeMap<String, String>,
}

impl EntryProps {
    pub const URL: &'static str = "url";
    pub const TITLE: &'static str = "title";

    pub fn new(url: impl Into<String>) -> Self {
        let mut props = BTreeMap::new();
        props.insert(Self::URL.to_string(), url.into());
        Self { props }
    }

    /// Builder-style setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.props.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.props.get(name).map(String::as_str)
    }

    pub fn url(&self) -> &str {
        self.get(Self::URL).unwrap_or_default()
    }

    pub fn title(&self) -> Option<&str> {
        self.get(Self::TITLE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.props.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
