//! YAML front matter
//!
//! A ruleset may start with a metadata block:
//!
//! ```text
//! ---
//! name: My blocklist
//! homepage: https://example.com/
//! ---
//! *://*.example.net/*
//! ```
//!
//! The block's lines still count toward line numbering.

use serde_json::{Map, Value};

/// Front matter as JSON values.
pub type Metadata = Map<String, Value>;

const DELIMITER: &str = "---";

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == DELIMITER
}

/// Returns how many leading lines the header occupies and its parsed content.
///
/// Without a closing delimiter there is no header. A header that is not a
/// YAML mapping still occupies its lines but yields empty metadata.
pub fn parse_front_matter<'a, I>(lines: I) -> (usize, Metadata)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut lines = lines.into_iter();
    if !lines.next().is_some_and(is_delimiter) {
        return (0, Metadata::new());
    }

    let mut body = Vec::new();
    for line in lines {
        if is_delimiter(line) {
            let header_len = body.len() + 2;
            return (header_len, parse_yaml(&body.join("\n")));
        }
        body.push(line);
    }

    (0, Metadata::new())
}

fn parse_yaml(yaml: &str) -> Metadata {
    if yaml.trim().is_empty() {
        return Metadata::new();
    }
    match serde_yaml::from_str::<Metadata>(yaml) {
        Ok(metadata) => metadata,
        Err(e) => {
            log::debug!("ignoring malformed front matter: {}", e);
            Metadata::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_front_matter() {
        let text = "---\nname: Example list\nversion: 3\ntags: [a, b]\n---\n*://example.com/*";
        let (len, metadata) = parse_front_matter(text.split('\n'));
        assert_eq!(len, 5);
        assert_eq!(metadata["name"], "Example list");
        assert_eq!(metadata["version"], 3);
        assert_eq!(metadata["tags"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_no_front_matter() {
        assert_eq!(parse_front_matter("*://example.com/*".split('\n')).0, 0);
        assert_eq!(parse_front_matter("---\nname: x".split('\n')).0, 0);
        assert_eq!(parse_front_matter(std::iter::empty()).0, 0);
    }

    #[test]
    fn test_empty_and_malformed_header() {
        let (len, metadata) = parse_front_matter("---\n---".split('\n'));
        assert_eq!(len, 2);
        assert!(metadata.is_empty());

        let (len, metadata) = parse_front_matter("---\n- not\n- a map\n---\nrule".split('\n'));
        assert_eq!(len, 4);
        assert!(metadata.is_empty());
    }
}
