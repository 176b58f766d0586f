//! serpguard Rule Compiler
//!
//! This crate compiles rule text into rulesets and resolves rule decisions
//! for search results.

pub mod builder;
pub mod error;
pub mod expression;
pub mod interactive;
mod literal;
pub mod metadata;
pub mod parser;
pub mod ruleset;

pub use builder::RulesetIndex;
pub use error::{PatchError, RulesetError, SyntaxError};
pub use expression::{Expression, LazyRegex, RegexFlags, StringOp};
pub use interactive::{InteractiveRuleset, Patch};
pub use metadata::Metadata;
pub use parser::{parse_line, ParsedRule, RuleKind};
pub use ruleset::{compile, Ruleset, SerializedRuleset};
