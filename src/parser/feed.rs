//! Atom/RSS link extractor (spec.md §4.5: "entry and enclosure links").
//!
//! Regex-based like the other default parsers; `<link href="...">` (Atom) and
//! `<link>...</link>` (RSS) are navigational, `<enclosure url="...">` is
//! embedded.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use super::{DiscoveredLink, LinkKind, LinkParserFacade};

static ATOM_LINK_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<link\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).unwrap());
static RSS_LINK_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<link>\s*([^<\s][^<]*?)\s*</link>").unwrap());
static ENCLOSURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<enclosure\b[^>]*?\burl\s*=\s*["']([^"']+)["']"#).unwrap());

pub struct FeedRegexParser;

impl LinkParserFacade for FeedRegexParser {
    fn parse(&self, body: &[u8], base_url: &str) -> Vec<DiscoveredLink> {
        let text = String::from_utf8_lossy(body);
        let base = Url::parse(base_url).ok();
        let resolve = |raw: &str| -> Option<String> {
            match &base {
                Some(b) => b.join(raw).ok().map(|u| u.to_string()),
                None => Some(raw.to_string()),
            }
        };

        let mut out = Vec::new();
        for cap in ATOM_LINK_HREF.captures_iter(&text) {
            if let Some(url) = resolve(&cap[1]) {
                out.push(DiscoveredLink {
                    url,
                    kind: LinkKind::Navigational,
                });
            }
        }
        for cap in RSS_LINK_ELEMENT.captures_iter(&text) {
            if let Some(url) = resolve(&cap[1]) {
                out.push(DiscoveredLink {
                    url,
                    kind: LinkKind::Navigational,
                });
            }
        }
        for cap in ENCLOSURE.captures_iter(&text) {
            if let Some(url) = resolve(&cap[1]) {
                out.push(DiscoveredLink {
                    url,
                    kind: LinkKind::Embedded,
                });
            }
        }
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_link_href_is_navigational() {
        let links = FeedRegexParser.parse(
            br#"<entry><link href="http://example.com/post/1"/></entry>"#,
            "http://example.com/feed.xml",
        );
        assert_eq!(links[0].url, "http://example.com/post/1");
        assert_eq!(links[0].kind, LinkKind::Navigational);
    }

    #[test]
    fn rss_link_element_is_navigational() {
        let links = FeedRegexParser.parse(
            b"<item><link>http://example.com/post/2</link></item>",
            "http://example.com/feed.xml",
        );
        assert_eq!(links[0].url, "http://example.com/post/2");
    }

    #[test]
    fn enclosure_is_embedded() {
        let links = FeedRegexParser.parse(
            br#"<item><enclosure url="http://example.com/audio.mp3" type="audio/mpeg"/></item>"#,
            "http://example.com/feed.xml",
        );
        assert_eq!(links[0].kind, LinkKind::Embedded);
    }
}
