//! serpguard Core Library
//!
//! This crate provides the match-pattern index and the shared types used by
//! the serpguard rule engine.
//!
//! # Architecture
//!
//! Rules that name a URL pattern are stored in a [`PatternIndex`], a trie keyed
//! by reversed domain labels. A lookup walks one node per host label and only
//! tests the buckets it passes, so its cost does not grow with the number of
//! stored rules.
//!
//! # Modules
//!
//! - `pattern`: Match pattern parsing and scheme/path tests
//! - `index`: The pattern index and its serialized form
//! - `psl`: Public Suffix List for registrable-domain extraction
//! - `url`: URL splitting for the lookup path
//! - `types`: Shared type definitions

pub mod index;
pub mod pattern;
pub mod psl;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use index::{EntryHandle, PatternIndex};
pub use pattern::{MatchPattern, PatternError};
pub use psl::{init_public_suffix_list, registrable_domain};
pub use types::{Decision, EntryProps, RuleMatch, Specifier};
pub use url::UrlParts;
