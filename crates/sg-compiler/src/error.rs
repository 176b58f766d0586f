use sg_core::PatternError;

/// Why a rule line compiled to no rule.
///
/// These never escape the compiler as failures; they are only logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("unexpected end of line")]
    UnexpectedEnd,
    #[error("unexpected {found:?} at column {column}")]
    Unexpected { found: char, column: usize },
    #[error("invalid escape sequence at column {0}")]
    InvalidEscape(usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated regular expression")]
    UnterminatedRegex,
    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),
    #[error("unsupported regular expression flag {0:?}")]
    InvalidRegexFlag(char),
    #[error("invalid specifier")]
    InvalidSpecifier,
    #[error("@if is only allowed after a match pattern")]
    MisplacedGuard,
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Patch workflow misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("No patch has been created")]
    NoPatch,
}

/// Error type for serialized ruleset loading.
#[derive(Debug, thiserror::Error)]
pub enum RulesetError {
    #[error("Invalid serialized ruleset: {0}")]
    Json(#[from] serde_json::Error),
}
