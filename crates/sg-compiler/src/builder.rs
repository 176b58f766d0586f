use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use sg_core::{EntryHandle, EntryProps, PatternIndex, RuleMatch, Specifier};

use crate::expression::{Expression, LazyRegex};
use crate::parser::{parse_line, RegexTarget, RuleKind};

/// Payload stored in the pattern index for a match-pattern rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    #[serde(rename = "line")]
    pub line_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifier: Option<Specifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Expression>,
}

impl PatternRule {
    fn fires(&self, props: &EntryProps) -> bool {
        self.guard.as_ref().map_or(true, |guard| guard.evaluate(props))
    }
}

/// Legacy `/re/` rule against one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexRule {
    #[serde(rename = "line")]
    pub line_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifier: Option<Specifier>,
    pub regex: LazyRegex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionRule {
    #[serde(rename = "line")]
    pub line_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifier: Option<Specifier>,
    pub expression: Expression,
}

/// Compiled rules of one ruleset, independent of its source text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesetIndex {
    patterns: PatternIndex<PatternRule>,
    #[serde(default)]
    url: Vec<RegexRule>,
    #[serde(default)]
    title: Vec<RegexRule>,
    #[serde(default)]
    expressions: Vec<ExpressionRule>,
}

impl RulesetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile one line into the index.
    ///
    /// Lines that do not parse are skipped. Returns the pattern index handle
    /// when the line became a match-pattern rule.
    pub fn add_line(&mut self, line_number: u32, line: &str) -> Option<EntryHandle> {
        let rule = match parse_line(line) {
            Ok(Some(rule)) => rule,
            Ok(None) => return None,
            Err(e) => {
                log::debug!("line {}: skipped: {}", line_number, e);
                return None;
            }
        };
        let specifier = rule.specifier;

        match rule.kind {
            RuleKind::MatchPattern { pattern, guard } => {
                let payload = PatternRule {
                    line_number,
                    specifier,
                    guard,
                };
                match self.patterns.insert_pattern(&pattern, payload) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        log::debug!("line {}: skipped: {}", line_number, e);
                        None
                    }
                }
            }
            RuleKind::Regex { target, regex } => {
                let rule = RegexRule {
                    line_number,
                    specifier,
                    regex,
                };
                match target {
                    RegexTarget::Url => self.url.push(rule),
                    RegexTarget::Title => self.title.push(rule),
                }
                None
            }
            RuleKind::Expression(expression) => {
                self.expressions.push(ExpressionRule {
                    line_number,
                    specifier,
                    expression,
                });
                None
            }
        }
    }

    /// Retract every rule compiled from `line_number`.
    pub fn remove_line(&mut self, line_number: u32, handle: Option<EntryHandle>) {
        if let Some(handle) = handle {
            self.patterns.remove(handle);
        }
        self.url.retain(|rule| rule.line_number != line_number);
        self.title.retain(|rule| rule.line_number != line_number);
        self.expressions.retain(|rule| rule.line_number != line_number);
    }

    /// Line number -> pattern index handle, for every live pattern rule.
    pub fn pattern_handles(&self) -> HashMap<u32, EntryHandle> {
        self.patterns
            .entries()
            .map(|(handle, rule)| (rule.line_number, handle))
            .collect()
    }

    /// Every rule that fires for `props`, ordered by line number.
    pub fn query(&self, props: &EntryProps) -> Vec<RuleMatch> {
        let mut fired = BTreeMap::new();

        for rule in self.patterns.lookup(props.url()) {
            if rule.fires(props) {
                fired.insert(rule.line_number, rule.specifier);
            }
        }

        let targets = [(RegexTarget::Url, &self.url), (RegexTarget::Title, &self.title)];
        for (target, rules) in targets {
            let Some(value) = props.get(target.prop()) else {
                continue;
            };
            for rule in rules {
                if !fired.contains_key(&rule.line_number) && rule.regex.is_match(value) {
                    fired.insert(rule.line_number, rule.specifier);
                }
            }
        }

        for rule in &self.expressions {
            if !fired.contains_key(&rule.line_number) && rule.expression.evaluate(props) {
                fired.insert(rule.line_number, rule.specifier);
            }
        }

        fired
            .into_iter()
            .map(|(line_number, specifier)| RuleMatch { line_number, specifier })
            .collect()
    }

    /// Number of live rules.
    pub fn rule_count(&self) -> usize {
        self.patterns.len() + self.url.len() + self.title.len() + self.expressions.len()
    }

    /// The match-pattern part of the index.
    pub fn patterns(&self) -> &PatternIndex<PatternRule> {
        &self.patterns
    }
}
