//! Rule line parser
//!
//! One line of rule text is
//!
//! ```text
//! [@[N]] (match-pattern | legacy-regex | expression) [@if(expression)] [# comment]
//! ```
//!
//! The body is tried in that order: a whitespace-delimited token that looks
//! like a match pattern wins, then `/re/flags` (optionally prefixed by
//! `url/` or `title/`), then a property expression.

use sg_core::pattern::ALL_URLS;
use sg_core::{MatchPattern, Specifier};

use crate::error::SyntaxError;
use crate::expression::{Expression, LazyRegex, RegexFlags, StringOp};
use crate::literal::parse_string;

// =============================================================================
// Parsed Rules
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRule {
    pub specifier: Option<Specifier>,
    pub kind: RuleKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    /// Goes into the pattern index.
    MatchPattern {
        pattern: MatchPattern,
        guard: Option<Expression>,
    },
    /// `/re/`, `url/re/` or `title/re/`.
    Regex { target: RegexTarget, regex: LazyRegex },
    Expression(Expression),
}

/// Property a legacy regex rule is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegexTarget {
    Url,
    Title,
}

impl RegexTarget {
    pub fn prop(self) -> &'static str {
        match self {
            Self::Url => sg_core::EntryProps::URL,
            Self::Title => sg_core::EntryProps::TITLE,
        }
    }
}

/// Parse one line. `Ok(None)` for blank and comment-only lines.
pub fn parse_line(line: &str) -> Result<Option<ParsedRule>, SyntaxError> {
    let mut cursor = Cursor::new(line);
    cursor.skip_ws();
    if cursor.at_end() || cursor.peek() == Some('#') {
        return Ok(None);
    }

    let specifier = parse_specifier(&mut cursor)?;
    cursor.skip_ws();

    let mut kind = parse_body(&mut cursor)?;
    let mut spaced = cursor.skip_ws();

    if cursor.eat_str("@if") {
        let RuleKind::MatchPattern { guard, .. } = &mut kind else {
            return Err(SyntaxError::MisplacedGuard);
        };
        cursor.skip_ws();
        expect(&mut cursor, '(')?;
        *guard = Some(parse_or(&mut cursor)?);
        cursor.skip_ws();
        expect(&mut cursor, ')')?;
        spaced = cursor.skip_ws();
    }

    match cursor.peek() {
        None => {}
        Some('#') if spaced => {}
        Some(_) => return Err(cursor.unexpected()),
    }

    Ok(Some(ParsedRule { specifier, kind }))
}

fn parse_specifier(cursor: &mut Cursor<'_>) -> Result<Option<Specifier>, SyntaxError> {
    if !cursor.eat('@') {
        return Ok(None);
    }

    let digits = cursor.take_while(|c| c.is_ascii_digit());
    if digits.is_empty() {
        return Ok(Some(Specifier::Negate));
    }

    match digits.parse::<u32>() {
        Ok(color) if color >= 1 => Ok(Some(Specifier::Highlight(color))),
        _ => Err(SyntaxError::InvalidSpecifier),
    }
}

fn parse_body(cursor: &mut Cursor<'_>) -> Result<RuleKind, SyntaxError> {
    let token = cursor.rest().split(char::is_whitespace).next().unwrap_or_default();
    if looks_like_pattern(token) {
        let pattern = token.parse::<MatchPattern>()?;
        cursor.advance(token.len());
        return Ok(RuleKind::MatchPattern { pattern, guard: None });
    }

    let target = if cursor.peek() == Some('/') {
        Some(RegexTarget::Url)
    } else if cursor.eat_str("url/") {
        cursor.retreat('/');
        Some(RegexTarget::Url)
    } else if cursor.eat_str("title/") {
        cursor.retreat('/');
        Some(RegexTarget::Title)
    } else {
        None
    };

    match target {
        Some(target) => {
            let regex = parse_regex(cursor)?;
            Ok(RuleKind::Regex { target, regex })
        }
        None => Ok(RuleKind::Expression(parse_or(cursor)?)),
    }
}

fn looks_like_pattern(token: &str) -> bool {
    if token == ALL_URLS {
        return true;
    }
    match token.find("://") {
        Some(end) => is_scheme(&token[..end]),
        None => false,
    }
}

fn is_scheme(s: &str) -> bool {
    if s == "*" {
        return true;
    }
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

// =============================================================================
// Regex Literals
// =============================================================================

/// `/pattern/flags`. A `/` inside `[...]` or after `\` does not close it.
fn parse_regex(cursor: &mut Cursor<'_>) -> Result<LazyRegex, SyntaxError> {
    expect(cursor, '/')?;

    let start = cursor.pos;
    let mut in_class = false;
    loop {
        match cursor.bump() {
            None => return Err(SyntaxError::UnterminatedRegex),
            Some('\\') => {
                cursor.bump().ok_or(SyntaxError::UnterminatedRegex)?;
            }
            Some('[') => in_class = true,
            Some(']') => in_class = false,
            Some('/') if !in_class => break,
            Some(_) => {}
        }
    }
    let source = &cursor.src[start..cursor.pos - 1];
    if source.is_empty() {
        return Err(SyntaxError::InvalidRegex("empty pattern".to_string()));
    }

    let flags = RegexFlags::parse(cursor.take_while(|c| c.is_ascii_alphabetic()))?;
    LazyRegex::new(source, flags)
}

// =============================================================================
// Expressions
// =============================================================================

fn parse_or(cursor: &mut Cursor<'_>) -> Result<Expression, SyntaxError> {
    let mut lhs = parse_and(cursor)?;
    loop {
        let checkpoint = cursor.pos;
        cursor.skip_ws();
        if !cursor.eat('|') {
            cursor.pos = checkpoint;
            return Ok(lhs);
        }
        let rhs = parse_and(cursor)?;
        lhs = Expression::Or(Box::new(lhs), Box::new(rhs));
    }
}

fn parse_and(cursor: &mut Cursor<'_>) -> Result<Expression, SyntaxError> {
    let mut lhs = parse_unary(cursor)?;
    loop {
        let checkpoint = cursor.pos;
        cursor.skip_ws();
        if !cursor.eat('&') {
            cursor.pos = checkpoint;
            return Ok(lhs);
        }
        let rhs = parse_unary(cursor)?;
        lhs = Expression::And(Box::new(lhs), Box::new(rhs));
    }
}

fn parse_unary(cursor: &mut Cursor<'_>) -> Result<Expression, SyntaxError> {
    cursor.skip_ws();
    if cursor.eat('!') {
        return Ok(Expression::Not(Box::new(parse_unary(cursor)?)));
    }
    if cursor.eat('(') {
        let inner = parse_or(cursor)?;
        cursor.skip_ws();
        expect(cursor, ')')?;
        return Ok(inner);
    }
    parse_predicate(cursor)
}

fn parse_predicate(cursor: &mut Cursor<'_>) -> Result<Expression, SyntaxError> {
    let prop = parse_ident(cursor)?;
    cursor.skip_ws();

    if cursor.eat_str("=~") {
        cursor.skip_ws();
        let regex = parse_regex(cursor)?;
        return Ok(Expression::Matches { prop, regex });
    }

    let op = if cursor.eat_str("^=") {
        StringOp::StartsWith
    } else if cursor.eat_str("$=") {
        StringOp::EndsWith
    } else if cursor.eat_str("*=") {
        StringOp::Contains
    } else if cursor.eat('=') {
        StringOp::Equals
    } else {
        return Err(cursor.unexpected());
    };

    cursor.skip_ws();
    let value = parse_string(cursor)?;

    // optional case-insensitivity flag
    let checkpoint = cursor.pos;
    cursor.skip_ws();
    let ignore_case = cursor.peek() == Some('i') && !cursor.peek_second().is_some_and(is_ident_char);
    if ignore_case {
        cursor.bump();
    } else {
        cursor.pos = checkpoint;
    }

    Ok(Expression::compare(prop, op, &value, ignore_case))
}

fn parse_ident(cursor: &mut Cursor<'_>) -> Result<String, SyntaxError> {
    match cursor.peek() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return Err(cursor.unexpected()),
    }
    Ok(cursor.take_while(is_ident_char).to_string())
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn expect(cursor: &mut Cursor<'_>, c: char) -> Result<(), SyntaxError> {
    if cursor.eat(c) {
        Ok(())
    } else {
        Err(cursor.unexpected())
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Character cursor over one line.
pub(crate) struct Cursor<'a> {
    src: &'a str,
    /// Byte offset into `src`, always on a char boundary.
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    pub(crate) fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    pub(crate) fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    pub(crate) fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, expected: &str) -> bool {
        if self.rest().starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }

    /// Step back over `c`, which must be the char just consumed.
    fn retreat(&mut self, c: char) {
        self.pos -= c.len_utf8();
    }

    fn advance(&mut self, bytes: usize) {
        self.pos = (self.pos + bytes).min(self.src.len());
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    /// Returns whether anything was skipped.
    fn skip_ws(&mut self) -> bool {
        !self.take_while(char::is_whitespace).is_empty()
    }

    /// 1-based character column of the cursor.
    pub(crate) fn column(&self) -> usize {
        self.src[..self.pos].chars().count() + 1
    }

    pub(crate) fn unexpected(&self) -> SyntaxError {
        match self.peek() {
            Some(found) => SyntaxError::Unexpected {
                found,
                column: self.column(),
            },
            None => SyntaxError::UnexpectedEnd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sg_core::EntryProps;

    fn rule(line: &str) -> ParsedRule {
        parse_line(line).unwrap().unwrap_or_else(|| panic!("{line} parsed to nothing"))
    }

    fn expression(line: &str) -> Expression {
        match rule(line).kind {
            RuleKind::Expression(expression) => expression,
            other => panic!("{line} parsed to {other:?}"),
        }
    }

    #[test]
    fn test_blank_and_comment_lines() {
        for line in ["", "   ", "# comment", "  # indented comment"] {
            assert_eq!(parse_line(line).unwrap(), None, "{line:?}");
        }
    }

    #[test]
    fn test_specifiers() {
        assert_eq!(rule("*://example.com/*").specifier, None);
        assert_eq!(rule("@*://example.com/*").specifier, Some(Specifier::Negate));
        assert_eq!(rule("@1*://example.com/*").specifier, Some(Specifier::Highlight(1)));
        assert_eq!(rule("@12 *://example.com/*").specifier, Some(Specifier::Highlight(12)));
        assert_eq!(parse_line("@0*://example.com/*"), Err(SyntaxError::InvalidSpecifier));
        assert_eq!(parse_line("@99999999999*://example.com/*"), Err(SyntaxError::InvalidSpecifier));
    }

    #[test]
    fn test_match_patterns() {
        let parsed = rule("  *://*.example.com/*  # trailing comment");
        assert_eq!(
            parsed.kind,
            RuleKind::MatchPattern {
                pattern: "*://*.example.com/*".parse().unwrap(),
                guard: None,
            }
        );
        assert!(matches!(rule("<all_urls>").kind, RuleKind::MatchPattern { pattern: MatchPattern::AllUrls, .. }));
        assert!(matches!(parse_line("*://exa*mple.com/*"), Err(SyntaxError::Pattern(_))));
    }

    #[test]
    fn test_comment_needs_whitespace() {
        assert!(parse_line(r##"title="a"#b"##).is_err());
        assert!(parse_line(r#"title="a" #b"#).unwrap().is_some());
    }

    #[test]
    fn test_guard() {
        let parsed = rule(r#"*://example.com/* @if(title *= "spam" i)"#);
        let RuleKind::MatchPattern { guard: Some(guard), .. } = parsed.kind else {
            panic!("guard missing");
        };
        assert!(guard.evaluate(&EntryProps::new("https://example.com/").with("title", "SPAM!")));
        assert!(!guard.evaluate(&EntryProps::new("https://example.com/").with("title", "ham")));

        assert_eq!(parse_line(r#"/spam/ @if(title="x")"#), Err(SyntaxError::MisplacedGuard));
        assert!(parse_line(r#"*://example.com/* @if(title="x""#).is_err());
        assert!(parse_line("*://example.com/* @if(url =~ /(/)").is_err());
    }

    #[test]
    fn test_legacy_regex() {
        let parsed = rule(r"/^https?:\/\/[^/]+\.example\.net\//i");
        let RuleKind::Regex { target, regex } = parsed.kind else {
            panic!("not a regex rule");
        };
        assert_eq!(target, RegexTarget::Url);
        assert_eq!(regex.flags(), RegexFlags::IGNORE_CASE);
        assert!(regex.is_match("HTTPS://www.example.net/page"));

        assert!(matches!(rule("title/Buy now/").kind, RuleKind::Regex { target: RegexTarget::Title, .. }));
        assert!(matches!(rule("url/example/").kind, RuleKind::Regex { target: RegexTarget::Url, .. }));
    }

    #[test]
    fn test_malformed_regex() {
        assert!(matches!(parse_line(r"/example\.(net|org/"), Err(SyntaxError::InvalidRegex(_))));
        assert_eq!(parse_line("/abc"), Err(SyntaxError::UnterminatedRegex));
        assert!(parse_line("//").is_err());
        assert_eq!(parse_line("/abc/q"), Err(SyntaxError::InvalidRegexFlag('q')));
    }

    #[test]
    fn test_expression_precedence() {
        let props = EntryProps::new("https://a.example/").with("title", "x");
        // a | b & !c  ==  a | (b & (!c))
        let parsed = expression(r#"url $= "/" | title = "y" & !title = "x""#);
        assert!(parsed.evaluate(&props));
        let grouped = expression(r#"(url $= "/" | title = "y") & !title = "x""#);
        assert!(!grouped.evaluate(&props));
    }

    #[test]
    fn test_expression_ops() {
        let props = EntryProps::new("https://shop.example/cart").with("title", "Cheap Deals");
        assert!(expression(r#"url ^= "https://shop.""#).evaluate(&props));
        assert!(expression(r#"url $= "/cart""#).evaluate(&props));
        assert!(expression(r#"title *= "deal" i"#).evaluate(&props));
        assert!(!expression(r#"title *= "deal""#).evaluate(&props));
        assert!(expression(r#"title = "cheap deals"i"#).evaluate(&props));
        assert!(expression(r"title =~ /^cheap/i").evaluate(&props));
        assert!(!expression(r#"$snippet = "x""#).evaluate(&props));
    }

    #[test]
    fn test_malformed_expressions() {
        assert!(parse_line(r#"title = "\u{zz}""#).is_err());
        assert!(parse_line(r#"title == "x""#).is_err());
        assert!(parse_line(r#"title = "x" &"#).is_err());
        assert!(parse_line(r#"(title = "x""#).is_err());
        assert!(parse_line(r#"title = "x" ix"#).is_err());
        assert!(parse_line("1abc = \"x\"").is_err());
    }

    #[test]
    fn test_error_column() {
        assert_eq!(
            parse_line(r#"title ? "x""#),
            Err(SyntaxError::Unexpected { found: '?', column: 7 })
        );
    }
}
