//! Matchers applied to the unconsumed console buffer.

use memchr::memmem;
use regex::bytes::Regex;
use std::fmt;
use std::ops::Range;
use vmprobe_core::{Error, Result};

/// A literal substring or a regular expression to look for in console output.
///
/// Plain strings convert into literals, so `"login:".into()` never treats
/// `$` or `.` specially. Use [`Pattern::regex`] for expressions.
#[derive(Debug, Clone)]
pub enum Pattern {
    Literal(Vec<u8>),
    Regex(Regex),
}

impl Pattern {
    pub fn literal(text: impl Into<Vec<u8>>) -> Self {
        Pattern::Literal(text.into())
    }

    pub fn regex(expr: &str) -> Result<Self> {
        Regex::new(expr)
            .map(Pattern::Regex)
            .map_err(|e| Error::InvalidPattern(format!("{expr}: {e}")))
    }

    /// Leftmost match in `haystack`.
    pub fn find(&self, haystack: &[u8]) -> Option<Range<usize>> {
        match self {
            Pattern::Literal(needle) => find_literal(haystack, needle),
            Pattern::Regex(re) => re.find(haystack).map(|m| m.range()),
        }
    }
}

fn find_literal(haystack: &[u8], needle: &[u8]) -> Option<Range<usize>> {
    if needle.is_empty() {
        return Some(0..0);
    }
    memmem::find(haystack, needle).map(|start| start..start + needle.len())
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
            Pattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Pattern::literal(s)
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Pattern::literal(s)
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Pattern::Regex(re)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_finds_leftmost() {
        let p = Pattern::from("ab");
        assert_eq!(p.find(b"xxabyab"), Some(2..4));
        assert_eq!(p.find(b"xxa"), None);
    }

    #[test]
    fn literal_does_not_interpret_metacharacters() {
        let p = Pattern::from("$");
        assert_eq!(p.find(b"no prompt yet"), None);
        assert_eq!(p.find(b"cirros$ "), Some(6..7));
    }

    #[test]
    fn literal_search_scales_to_full_buffers() {
        let mut haystack = vec![b'a'; 1024 * 1024];
        haystack.extend_from_slice(b"aab login: ");
        let start = haystack.len() - 9;
        assert_eq!(Pattern::from("b login").find(&haystack), Some(start..start + 7));
        assert_eq!(Pattern::from("longer than the haystack").find(b"short"), None);
    }

    #[test]
    fn empty_literal_matches_immediately() {
        assert_eq!(Pattern::from("").find(b""), Some(0..0));
    }

    #[test]
    fn regex_matches_bytes() {
        let p = Pattern::regex(r"processors?: (\d+)").unwrap();
        assert_eq!(p.find(b"--processors: 3\n"), Some(2..15));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = Pattern::regex("(unclosed").unwrap_err();
        assert!(matches!(err, Error::InvalidPattern(_)));
    }

    #[test]
    fn display_distinguishes_kinds() {
        assert_eq!(Pattern::from("login").to_string(), "\"login\"");
        assert_eq!(Pattern::regex("a+").unwrap().to_string(), "/a+/");
    }
}
