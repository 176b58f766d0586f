//! Double-quoted string literals with C-style escapes.
//!
//! Supported escapes: `\n \r \t \b \f \v \\ \" \' \/`, octal `\0`..`\377`,
//! `\xHH`, `\uHHHH` and `\u{H..}`. Anything else is a syntax error.

use crate::error::SyntaxError;
use crate::parser::Cursor;

/// Parse a literal starting at the opening quote; leaves the cursor after the closing quote.
pub(crate) fn parse_string(cursor: &mut Cursor<'_>) -> Result<String, SyntaxError> {
    if !cursor.eat('"') {
        return Err(cursor.unexpected());
    }

    let mut value = String::new();
    loop {
        let column = cursor.column();
        match cursor.bump() {
            None => return Err(SyntaxError::UnterminatedString),
            Some('"') => return Ok(value),
            Some('\\') => value.push(parse_escape(cursor, column)?),
            Some(c) => value.push(c),
        }
    }
}

fn parse_escape(cursor: &mut Cursor<'_>, column: usize) -> Result<char, SyntaxError> {
    let invalid = || SyntaxError::InvalidEscape(column);
    let c = cursor.bump().ok_or(SyntaxError::UnterminatedString)?;

    let code = match c {
        'n' => return Ok('\n'),
        'r' => return Ok('\r'),
        't' => return Ok('\t'),
        'b' => return Ok('\u{8}'),
        'f' => return Ok('\u{c}'),
        'v' => return Ok('\u{b}'),
        '\\' | '"' | '\'' | '/' => return Ok(c),
        '0'..='7' => {
            let mut value = c as u32 - '0' as u32;
            for _ in 0..2 {
                match cursor.peek().and_then(|d| d.to_digit(8)) {
                    Some(d) if value * 8 + d <= 0o377 => {
                        value = value * 8 + d;
                        cursor.bump();
                    }
                    _ => break,
                }
            }
            value
        }
        'x' => hex_digits(cursor, 2).ok_or_else(invalid)?,
        'u' if cursor.eat('{') => {
            let mut value = 0u32;
            let mut digits = 0;
            loop {
                match cursor.bump() {
                    Some('}') if digits > 0 => break,
                    Some(d) if digits < 6 => {
                        value = value * 16 + d.to_digit(16).ok_or_else(invalid)?;
                        digits += 1;
                    }
                    _ => return Err(invalid()),
                }
            }
            value
        }
        'u' => hex_digits(cursor, 4).ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };

    char::from_u32(code).ok_or_else(invalid)
}

fn hex_digits(cursor: &mut Cursor<'_>, count: usize) -> Option<u32> {
    let mut value = 0u32;
    for _ in 0..count {
        let digit = cursor.peek()?.to_digit(16)?;
        cursor.bump();
        value = value * 16 + digit;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<String, SyntaxError> {
        let mut cursor = Cursor::new(src);
        let value = parse_string(&mut cursor)?;
        assert!(cursor.at_end(), "{src} left {:?}", cursor.rest());
        Ok(value)
    }

    #[test]
    fn test_plain() {
        assert_eq!(parse(r#""hello world""#).unwrap(), "hello world");
        assert_eq!(parse(r#""""#).unwrap(), "");
    }

    #[test]
    fn test_simple_escapes() {
        assert_eq!(parse(r#""a\nb\tc\\d\"e""#).unwrap(), "a\nb\tc\\d\"e");
        assert_eq!(parse(r#""\b\f\v\r""#).unwrap(), "\u{8}\u{c}\u{b}\r");
    }

    #[test]
    fn test_numeric_escapes() {
        assert_eq!(parse(r#""\101\0""#).unwrap(), "A\0");
        assert_eq!(parse(r#""\400""#).unwrap(), " 0");
        assert_eq!(parse(r#""\x41\x7e""#).unwrap(), "A~");
        assert_eq!(parse(r#""é\u{1F600}""#).unwrap(), "é\u{1F600}");
    }

    #[test]
    fn test_malformed_escapes() {
        for bad in [r#""\x4""#, r#""\xZZ""#, r#""\u12""#, r#""\u{}""#, r#""\u{110000}""#, r#""\ud800""#, r#""\q""#, r#""\u{1234567}""#] {
            assert!(matches!(parse(bad), Err(SyntaxError::InvalidEscape(_))), "{bad}");
        }
    }

    #[test]
    fn test_unterminated() {
        assert_eq!(parse(r#""abc"#), Err(SyntaxError::UnterminatedString));
        assert_eq!(parse(r#""abc\"#), Err(SyntaxError::UnterminatedString));
    }
}
