//! Line-addressed rulesets
//!
//! A [`Ruleset`] keeps its source text line by line next to the compiled
//! [`RulesetIndex`]. Line numbers are 1-based and never shift: deleting a line
//! leaves a hole, and [`Ruleset::extend`] only appends. Holes disappear when
//! the ruleset is turned back into text and rebuilt.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use sg_core::{EntryHandle, EntryProps, RuleMatch};

use crate::builder::RulesetIndex;
use crate::error::RulesetError;
use crate::metadata::{parse_front_matter, Metadata};

/// Compile rule text into an index without keeping the text.
pub fn compile(text: &str) -> RulesetIndex {
    Ruleset::new(text).index
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    /// `None` marks a deleted line.
    source: Vec<Option<String>>,
    metadata: Metadata,
    index: RulesetIndex,
    /// Pattern index handle per match-pattern line.
    handles: HashMap<u32, EntryHandle>,
}

impl Ruleset {
    pub fn new(text: &str) -> Self {
        let lines = split_lines(text);
        let (header_len, metadata) = parse_front_matter(lines.iter().copied());

        let mut ruleset = Self {
            metadata,
            ..Self::default()
        };
        for (i, line) in lines.iter().enumerate() {
            if i < header_len {
                ruleset.source.push(Some(line.to_string()));
            } else {
                ruleset.push_line(line);
            }
        }
        log::debug!(
            "compiled ruleset: {} lines, {} rules",
            ruleset.source.len(),
            ruleset.index.rule_count()
        );
        ruleset
    }

    fn push_line(&mut self, line: &str) {
        self.source.push(Some(line.to_string()));
        let line_number = self.source.len() as u32;
        if let Some(handle) = self.index.add_line(line_number, line) {
            self.handles.insert(line_number, handle);
        }
    }

    /// Append rule text, compiling only the new lines.
    ///
    /// Existing lines keep their number and text. A trailing empty line stays
    /// in place and the new lines follow it.
    pub fn extend(&mut self, text: &str) {
        let lines = split_lines(text);
        if lines.is_empty() {
            return;
        }
        for line in lines {
            self.push_line(line);
        }
    }

    /// Soft-delete a line. Returns false if it was absent or already deleted.
    pub fn delete(&mut self, line_number: u32) -> bool {
        let Some(slot) = line_number
            .checked_sub(1)
            .and_then(|i| self.source.get_mut(i as usize))
        else {
            return false;
        };
        if slot.take().is_none() {
            return false;
        }
        self.index.remove_line(line_number, self.handles.remove(&line_number));
        true
    }

    /// Text of a live line.
    pub fn get(&self, line_number: u32) -> Option<&str> {
        let i = line_number.checked_sub(1)? as usize;
        self.source.get(i)?.as_deref()
    }

    /// Live lines with their numbers, in order.
    pub fn lines(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.source
            .iter()
            .enumerate()
            .filter_map(|(i, line)| line.as_deref().map(|line| (i as u32 + 1, line)))
    }

    /// Highest line number assigned so far, deleted lines included.
    pub fn line_count(&self) -> usize {
        self.source.len()
    }

    /// Every rule that fires for `props`, ordered by line number.
    pub fn query(&self, props: &EntryProps) -> Vec<RuleMatch> {
        self.index.query(props)
    }

    /// True if at least one rule fires and all of them are plain blocks.
    pub fn test(&self, props: &EntryProps) -> bool {
        let matches = self.query(props);
        !matches.is_empty() && matches.iter().all(RuleMatch::is_plain_block)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The `name` front matter key.
    pub fn name(&self) -> Option<&str> {
        self.metadata.get("name").and_then(|v| v.as_str())
    }

    pub fn index(&self) -> &RulesetIndex {
        &self.index
    }

    pub fn to_serializable(&self) -> SerializedRuleset {
        SerializedRuleset {
            source: self.source.clone(),
            metadata: self.metadata.clone(),
            index: self.index.clone(),
        }
    }

    /// Rebuild from a serialized form without reparsing any rule.
    pub fn from_serializable(serialized: SerializedRuleset) -> Self {
        let handles = serialized.index.pattern_handles();
        Self {
            source: serialized.source,
            metadata: serialized.metadata,
            index: serialized.index,
            handles,
        }
    }

    pub fn to_json(&self) -> Result<String, RulesetError> {
        Ok(serde_json::to_string(&self.to_serializable())?)
    }

    pub fn from_json(json: &str) -> Result<Self, RulesetError> {
        let serialized: SerializedRuleset = serde_json::from_str(json)?;
        Ok(Self::from_serializable(serialized))
    }
}

/// Live lines joined with `\n`.
impl fmt::Display for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (_, line)) in self.lines().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(line)?;
        }
        Ok(())
    }
}

/// Persistent form of a [`Ruleset`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedRuleset {
    pub source: Vec<Option<String>>,
    #[serde(default)]
    pub metadata: Metadata,
    pub index: RulesetIndex,
}
