//! Match pattern parsing
//!
//! Match patterns follow the WebExtension mini-language:
//!
//! ```text
//! <all_urls>
//! <scheme>://<host><path>
//! ```
//!
//! where `scheme` is `*` or a concrete scheme, `host` is `*`, `*.<domain>` or
//! an exact host, and `path` starts with `/` and may contain `*` wildcards.

use std::fmt;
use std::str::FromStr;

/// Token matching every URL.
pub const ALL_URLS: &str = "<all_urls>";

/// Scheme wildcard.
pub const ANY_SCHEME: &str = "*";

/// Path wildcard matching any path and query.
pub const ANY_PATH: &str = "/*";

/// Errors raised while parsing or indexing a match pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid match pattern: {0}")]
    InvalidPattern(String),
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
}

// =============================================================================
// Host Patterns
// =============================================================================

/// Host part of a match pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostPattern {
    /// `*`
    Any,
    /// `*.<domain>` - the domain itself and every subdomain
    Subdomains(String),
    /// An exact host
    Exact(String),
}

impl HostPattern {
    fn parse(host: &str) -> Option<Self> {
        if host == "*" {
            return Some(Self::Any);
        }
        if let Some(domain) = host.strip_prefix("*.") {
            return normalize_host(domain).map(Self::Subdomains);
        }
        normalize_host(host).map(Self::Exact)
    }

    /// The domain walked in the index and whether it covers subdomains.
    pub fn domain(&self) -> (&str, bool) {
        match self {
            Self::Any => ("", true),
            Self::Subdomains(domain) => (domain, true),
            Self::Exact(host) => (host, false),
        }
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Subdomains(domain) => write!(f, "*.{domain}"),
            Self::Exact(host) => f.write_str(host),
        }
    }
}

/// Lowercase and IDNA-normalize a host so it compares equal to `Url::host_str`.
fn normalize_host(host: &str) -> Option<String> {
    if host.is_empty() || host.contains('*') {
        return None;
    }
    url::Host::parse(host).ok().map(|parsed| parsed.to_string())
}

// =============================================================================
// Match Patterns
// =============================================================================

/// Parsed form of a match pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchPattern {
    AllUrls,
    Url {
        /// Lowercased scheme or `*`
        scheme: String,
        host: HostPattern,
        /// Path pattern, always starting with `/`
        path: String,
    },
}

impl FromStr for MatchPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ALL_URLS {
            return Ok(Self::AllUrls);
        }

        let invalid = || PatternError::InvalidPattern(s.to_string());

        let (scheme, rest) = s.split_once("://").ok_or_else(invalid)?;
        if !is_valid_scheme(scheme) {
            return Err(invalid());
        }

        let path_start = rest.find('/').ok_or_else(invalid)?;
        let (host, path) = rest.split_at(path_start);
        let host = HostPattern::parse(host).ok_or_else(invalid)?;

        Ok(Self::Url {
            scheme: scheme.to_ascii_lowercase(),
            host,
            path: path.to_string(),
        })
    }
}

impl fmt::Display for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllUrls => f.write_str(ALL_URLS),
            Self::Url { scheme, host, path } => write!(f, "{scheme}://{host}{path}"),
        }
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    if scheme == ANY_SCHEME {
        return true;
    }
    let mut bytes = scheme.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.')
}

// =============================================================================
// Scheme / Path Tests
// =============================================================================

/// `*` covers http and https only; anything else must match exactly.
#[inline]
pub fn scheme_matches(pattern: &str, scheme: &str) -> bool {
    if pattern == ANY_SCHEME {
        crate::url::is_web_scheme(scheme)
    } else {
        pattern == scheme
    }
}

/// Anchored glob match of a path pattern against `path[?query]`.
#[inline]
pub fn path_matches(pattern: &str, path_and_query: &str) -> bool {
    pattern == ANY_PATH || glob_match(pattern.as_bytes(), path_and_query.as_bytes())
}

/// `*` matches any run of bytes (including none); everything else is literal.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    // Position of the last `*` seen and the text offset it is currently absorbing up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, absorbed)) = backtrack {
            p = star + 1;
            t = absorbed + 1;
            backtrack = Some((star, absorbed + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_urls() {
        assert_eq!("<all_urls>".parse::<MatchPattern>(), Ok(MatchPattern::AllUrls));
    }

    #[test]
    fn test_parse_normalizes_case() {
        let pattern: MatchPattern = "HTTPS://*.Example.COM/Path".parse().unwrap();
        assert_eq!(
            pattern,
            MatchPattern::Url {
                scheme: "https".to_string(),
                host: HostPattern::Subdomains("example.com".to_string()),
                path: "/Path".to_string(),
            }
        );
        assert_eq!(pattern.to_string(), "https://*.example.com/Path");
    }

    #[test]
    fn test_parse_rejects_invalid() {
        for bad in ["", "example.com", "*://example.com", "*://*.*/*", "*://a*b.com/*", "1http://a.com/*", "*://*./*", "*:///x", "*://a.com:80/*"] {
            assert!(
                matches!(bad.parse::<MatchPattern>(), Err(PatternError::InvalidPattern(_))),
                "{bad} should be invalid"
            );
        }
    }

    #[test]
    fn test_parse_keeps_unsupported_schemes() {
        // Scheme support is an index concern; parsing accepts any scheme.
        assert!("ftp://example.com/*".parse::<MatchPattern>().is_ok());
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match(b"/a/*/c", b"/a/b/c"));
        assert!(glob_match(b"/a/*/c", b"/a/b/x/c"));
        assert!(!glob_match(b"/a/*/c", b"/a/b/c/d"));
        assert!(glob_match(b"/*/b/*/", b"/a/b/c/"));
        assert!(glob_match(b"/", b"/"));
        assert!(!glob_match(b"/", b"/x"));
        assert!(glob_match(b"/path*", b"/path?q=1"));
        assert!(glob_match(b"*", b""));
        assert!(!glob_match(b"/a", b""));
    }
}
