//! Resource Group wildcard pattern compiler (spec.md §3.1 "Resource Group").
//!
//! `*` matches one path segment with no `/`, `**` matches any suffix
//! (including further `/`), `#` matches an integer. Everything else is a
//! literal matched verbatim. Patterns compile to an anchored [`regex::Regex`]
//! so the in-memory membership strategy (spec.md §4.2 "linear scan") can test
//! a whole URL index without a SQL engine to delegate to.

use regex::Regex;

use crate::error::CrystalError;

/// Compiles a Resource Group `url_pattern` into an anchored regex.
pub fn compile_pattern(pattern: &str) -> Result<Regex, CrystalError> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                out.push_str(".*");
                i += 2;
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '#' => {
                out.push_str("[0-9]+");
                i += 1;
            }
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    out.push('$');

    Regex::new(&out).map_err(CrystalError::from)
}

/// Whether `pattern` has no wildcard before its first literal `/`-delimited
/// segment, meaning it can be served by a URL-prefix range query (spec.md
/// §4.2, membership strategy 2) instead of a full scan.
pub fn has_literal_prefix(pattern: &str) -> bool {
    match pattern.find(['*', '#']) {
        None => true,
        Some(idx) => pattern[..idx].contains('/'),
    }
}

/// The literal URL prefix usable for a range query, per [`has_literal_prefix`].
pub fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '#']) {
        None => pattern,
        Some(idx) => {
            let prefix = &pattern[..idx];
            match prefix.rfind('/') {
                Some(slash) => &prefix[..=slash],
                None => "",
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_star_matches_one_segment() {
        let re = compile_pattern("http://example.com/*/page").unwrap();
        assert!(re.is_match("http://example.com/a/page"));
        assert!(!re.is_match("http://example.com/a/b/page"));
    }

    #[test]
    fn double_star_matches_suffix() {
        let re = compile_pattern("http://example.com/**").unwrap();
        assert!(re.is_match("http://example.com/a/b/c"));
    }

    #[test]
    fn hash_matches_integer() {
        let re = compile_pattern("http://example.com/comic/#").unwrap();
        assert!(re.is_match("http://example.com/comic/123"));
        assert!(!re.is_match("http://example.com/comic/abc"));
    }

    #[test]
    fn literal_characters_are_escaped() {
        let re = compile_pattern("http://example.com/a.b?(c)").unwrap();
        assert!(re.is_match("http://example.com/a.b?(c)"));
        assert!(!re.is_match("http://exampleXcom/aXb?(c)"));
    }

    #[test]
    fn detects_literal_prefix_for_range_queries() {
        assert!(has_literal_prefix("http://example.com/fixed/*"));
        assert!(!has_literal_prefix("http://*.example.com/"));
        assert_eq!(literal_prefix("http://example.com/fixed/*"), "http://example.com/fixed/");
    }
}
