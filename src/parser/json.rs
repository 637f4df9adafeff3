//! JSON link extractor (spec.md §4.5: "any string that is a valid absolute
//! URL (embedded)"). Walks the parsed value rather than regexing the raw
//! bytes so quoting/escaping inside string values can't produce false
//! matches.

use serde_json::Value;

use super::{DiscoveredLink, LinkKind, LinkParserFacade};

pub struct JsonUrlParser;

impl LinkParserFacade for JsonUrlParser {
    fn parse(&self, body: &[u8], _base_url: &str) -> Vec<DiscoveredLink> {
        let Ok(value) = serde_json::from_slice::<Value>(body) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        collect_urls(&value, &mut out);
        out
    }
}

fn collect_urls(value: &Value, out: &mut Vec<DiscoveredLink>) {
    match value {
        Value::String(s) => {
            if url::Url::parse(s).is_ok() {
                out.push(DiscoveredLink {
                    url: s.clone(),
                    kind: LinkKind::Embedded,
                });
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_urls(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_urls(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_absolute_urls_nested_in_objects_and_arrays() {
        let body = br#"{"images":["http://example.com/a.png","not-a-url"],"meta":{"next":"http://example.com/b"}}"#;
        let links = JsonUrlParser.parse(body, "http://example.com/");
        let urls: Vec<_> = links.iter().map(|l| l.url.as_str()).collect();
        assert!(urls.contains(&"http://example.com/a.png"));
        assert!(urls.contains(&"http://example.com/b"));
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn invalid_json_yields_no_links() {
        assert!(JsonUrlParser.parse(b"not json", "http://x/").is_empty());
    }
}
