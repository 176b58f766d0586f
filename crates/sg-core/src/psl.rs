//! Public Suffix List (PSL) utilities for registrable-domain extraction
//!
//! A full list can be loaded at startup with [`init_public_suffix_list`].
//! Until then a small built-in heuristic is used.
//!
//! # Examples
//!
//! ```
//! use sg_core::psl::registrable_domain;
//!
//! assert_eq!(registrable_domain("sub.example.com"), "example.com");
//! assert_eq!(registrable_domain("sub.example.co.uk"), "example.co.uk");
//! ```

use std::net::IpAddr;
use std::sync::RwLock;

use publicsuffix::{List, Psl};

/// Error type for PSL loading.
#[derive(Debug, thiserror::Error)]
pub enum PslError {
    #[error("Invalid public suffix list: {0}")]
    InvalidList(String),
}

// =============================================================================
// Global PSL State
// =============================================================================

static PUBLIC_SUFFIX_LIST: RwLock<Option<List>> = RwLock::new(None);

/// Load the public suffix list from its text form (`public_suffix_list.dat`).
pub fn init_public_suffix_list(text: &str) -> Result<(), PslError> {
    let list = text
        .parse::<List>()
        .map_err(|e| PslError::InvalidList(e.to_string()))?;
    if let Ok(mut guard) = PUBLIC_SUFFIX_LIST.write() {
        *guard = Some(list);
        log::debug!("public suffix list loaded");
    }
    Ok(())
}

// =============================================================================
// Registrable Domain Extraction
// =============================================================================

/// Common two-part TLDs for fallback.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// Get the registrable domain (eTLD+1) of a host.
///
/// IP addresses and single-label hosts are returned unchanged.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    if is_ip_host(&host) {
        return host;
    }

    if let Ok(guard) = PUBLIC_SUFFIX_LIST.read() {
        if let Some(list) = guard.as_ref() {
            if let Some(domain) = list.domain(host.as_bytes()) {
                if let Ok(domain) = std::str::from_utf8(domain.as_bytes()) {
                    return domain.to_string();
                }
            }
        }
    }

    let labels: Vec<&str> = host.split('.').collect();
    fallback_registrable_domain(&labels)
}

/// True for IPv4 literals and (bracketed) IPv6 literals.
pub fn is_ip_host(host: &str) -> bool {
    host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>().is_ok()
}

/// Fallback eTLD+1 heuristic.
fn fallback_registrable_domain(labels: &[&str]) -> String {
    let n = labels.len();
    if n <= 2 {
        return labels.join(".");
    }

    // Check for common two-part TLDs
    let last_two = format!("{}.{}", labels[n - 2], labels[n - 1]);
    if COMMON_TWO_PART_TLDS.contains(&last_two.as_str()) {
        return labels[n - 3..].join(".");
    }

    // Default: last 2 labels
    labels[n - 2..].join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_simple() {
        assert_eq!(fallback_registrable_domain(&["example", "com"]), "example.com");
        assert_eq!(fallback_registrable_domain(&["sub", "example", "com"]), "example.com");
        assert_eq!(fallback_registrable_domain(&["localhost"]), "localhost");
    }

    #[test]
    fn test_fallback_two_part() {
        assert_eq!(fallback_registrable_domain(&["sub", "example", "co", "uk"]), "example.co.uk");
        assert_eq!(fallback_registrable_domain(&["example", "co", "uk"]), "example.co.uk");
    }

    #[test]
    fn test_ip_hosts_are_kept() {
        assert_eq!(registrable_domain("192.168.0.1"), "192.168.0.1");
        assert_eq!(registrable_domain("[::1]"), "[::1]");
        assert!(is_ip_host("10.0.0.1"));
        assert!(!is_ip_host("example.com"));
    }
}
