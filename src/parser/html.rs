//! Default HTML link extractor (spec.md §4.5 "Required recognitions").
//!
//! Regex-based rather than a full DOM parser — the facade only needs *a*
//! usable default to be testable end to end; a host may register a richer
//! parser (`scraper`/`html5ever`-backed) through [`super::register`] for the
//! full set of edge cases a real browser handles.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use super::{DiscoveredLink, LinkKind, LinkParserFacade};

static HREF_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).unwrap());
static LINK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<link\b([^>]*?)\bhref\s*=\s*["']([^"']+)["']([^>]*)>"#).unwrap()
});
static IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap());
static IMG_SRCSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<img\b[^>]*?\bsrcset\s*=\s*["']([^"']+)["']"#).unwrap());
static SOURCE_SRCSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<source\b[^>]*?\bsrcset\s*=\s*["']([^"']+)["']"#).unwrap());
static SCRIPT_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<script\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap());
static FRAME_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<i?frame\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap());
static FORM_ACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<form\b[^>]*?\baction\s*=\s*["']([^"']+)["']"#).unwrap());
static BACKGROUND_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)\bbackground\s*=\s*["']([^"']+)["']"#).unwrap());
static STYLE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)\bstyle\s*=\s*["'][^"']*url\(\s*['"]?([^'")]+)['"]?\s*\)"#).unwrap());
static ONCLICK_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\bonclick\s*=\s*["'][^"']*\.location\s*=\s*['"]([^'"]+)['"]"#).unwrap()
});

pub struct HtmlRegexParser;

impl LinkParserFacade for HtmlRegexParser {
    fn parse(&self, body: &[u8], base_url: &str) -> Vec<DiscoveredLink> {
        let text = String::from_utf8_lossy(body);
        let base = Url::parse(base_url).ok();
        let mut out = Vec::new();

        let resolve = |raw: &str| -> Option<String> {
            match &base {
                Some(b) => b.join(raw).ok().map(|u| u.to_string()),
                None => Some(raw.to_string()),
            }
        };

        for cap in HREF_LINK.captures_iter(&text) {
            push(&mut out, resolve(&cap[1]), LinkKind::Navigational);
        }
        for cap in LINK_TAG.captures_iter(&text) {
            let rel_attrs = format!("{}{}", &cap[1], &cap[3]);
            let embedded = ["stylesheet", "icon", "preload"]
                .iter()
                .any(|rel| rel_attrs.to_ascii_lowercase().contains(rel));
            let kind = if embedded {
                LinkKind::Embedded
            } else {
                LinkKind::Navigational
            };
            push(&mut out, resolve(&cap[2]), kind);
        }
        for cap in IMG_SRC.captures_iter(&text) {
            push(&mut out, resolve(&cap[1]), LinkKind::Embedded);
        }
        for regex in [&*IMG_SRCSET, &*SOURCE_SRCSET] {
            for cap in regex.captures_iter(&text) {
                for candidate in split_srcset(&cap[1]) {
                    push(&mut out, resolve(&candidate), LinkKind::Embedded);
                }
            }
        }
        for cap in SCRIPT_SRC.captures_iter(&text) {
            push(&mut out, resolve(&cap[1]), LinkKind::Embedded);
        }
        for cap in FRAME_SRC.captures_iter(&text) {
            push(&mut out, resolve(&cap[1]), LinkKind::Embedded);
        }
        for cap in FORM_ACTION.captures_iter(&text) {
            push(&mut out, resolve(&cap[1]), LinkKind::Navigational);
        }
        for cap in BACKGROUND_ATTR.captures_iter(&text) {
            push(&mut out, resolve(&cap[1]), LinkKind::Embedded);
        }
        for cap in STYLE_URL.captures_iter(&text) {
            push(&mut out, resolve(&cap[1]), LinkKind::Embedded);
        }
        for cap in ONCLICK_LOCATION.captures_iter(&text) {
            push(&mut out, resolve(&cap[1]), LinkKind::Navigational);
        }

        out.dedup();
        out
    }
}

fn push(out: &mut Vec<DiscoveredLink>, url: Option<String>, kind: LinkKind) {
    if let Some(url) = url {
        out.push(DiscoveredLink { url, kind });
    }
}

/// `srcset="a.png 1x, b.png 2x"` → `["a.png", "b.png"]`.
fn split_srcset(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(|candidate| candidate.trim().split_whitespace().next())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_anchor_and_resolves_relative() {
        let links = HtmlRegexParser.parse(
            br#"<a href="page2.html">next</a>"#,
            "http://example.com/dir/page1.html",
        );
        assert_eq!(links[0].url, "http://example.com/dir/page2.html");
        assert_eq!(links[0].kind, LinkKind::Navigational);
    }

    #[test]
    fn link_tag_stylesheet_is_embedded() {
        let links = HtmlRegexParser.parse(
            br#"<link rel="stylesheet" href="style.css">"#,
            "http://example.com/",
        );
        assert_eq!(links[0].kind, LinkKind::Embedded);
    }

    #[test]
    fn srcset_splits_multiple_candidates() {
        let links = HtmlRegexParser.parse(
            br#"<img srcset="a.png 1x, b.png 2x">"#,
            "http://example.com/",
        );
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.kind == LinkKind::Embedded));
    }

    #[test]
    fn onclick_location_is_recognized() {
        let links = HtmlRegexParser.parse(
            br#"<div onclick="window.location='/go'">click</div>"#,
            "http://example.com/",
        );
        assert_eq!(links[0].url, "http://example.com/go");
    }
}
