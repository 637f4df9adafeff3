//! CSS link extractor (spec.md §4.5: `url(...)`, `@import`).

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use super::{DiscoveredLink, LinkKind, LinkParserFacade};

static URL_FN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#).unwrap());
static IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*['"]?([^'")]+)['"]?\s*\)|['"]([^'"]+)['"])"#).unwrap()
});

pub struct CssRegexParser;

impl LinkParserFacade for CssRegexParser {
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
        for cap in URL_FN.captures_iter(&text) {
            if let Some(url) = resolve(&cap[1]) {
                out.push(DiscoveredLink {
                    url,
                    kind: LinkKind::Embedded,
                });
            }
        }
        for cap in IMPORT.captures_iter(&text) {
            let raw = cap.get(1).or_else(|| cap.get(2)).map(|m| m.as_str());
            if let Some(url) = raw.and_then(&resolve) {
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
    fn extracts_url_function() {
        let links = CssRegexParser.parse(
            b"body { background: url('bg.png'); }",
            "http://example.com/css/",
        );
        assert_eq!(links[0].url, "http://example.com/css/bg.png");
        assert_eq!(links[0].kind, LinkKind::Embedded);
    }

    #[test]
    fn extracts_import_with_and_without_url_fn() {
        let links = CssRegexParser.parse(
            br#"@import url("a.css"); @import "b.css";"#,
            "http://example.com/",
        );
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "http://example.com/a.css");
        assert_eq!(links[1].url, "http://example.com/b.css");
    }
}
