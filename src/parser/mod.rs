//! Link Parser Facade (spec.md §4.5).
//!
//! A small content-type → parser registry, the same registration pattern the
//! teacher uses for its `CodecMap` (`codec/mod.rs`): a global, insertable,
//! trait-object registry rather than a hardcoded match. The crate ships
//! regex-based default extractors for HTML/CSS/JSON/Atom+RSS so the facade
//! is usable end to end; a host may register a richer parser (e.g. backed by
//! `scraper`/`html5ever`) through the same registry.

pub mod css;
pub mod feed;
pub mod html;
pub mod json;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

/// Whether a discovered link is a page-embedded resource (image, stylesheet,
/// script — fetched as part of rendering the page) or a navigational link a
/// user could follow (spec.md §4.5 "Interface to the core").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Embedded,
    Navigational,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    pub url: String,
    pub kind: LinkKind,
}

/// `parse(body, content_type, base_url) -> iter<(link_url, kind)>`
/// (spec.md §4.5 "Interface to the core").
pub trait LinkParserFacade: Send + Sync {
    fn parse(&self, body: &[u8], base_url: &str) -> Vec<DiscoveredLink>;
}

struct Registry {
    by_content_type: HashMap<String, Arc<dyn LinkParserFacade>>,
}

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| {
    let mut by_content_type: HashMap<String, Arc<dyn LinkParserFacade>> = HashMap::new();
    by_content_type.insert(
        "text/html".to_string(),
        Arc::new(html::HtmlRegexParser) as Arc<dyn LinkParserFacade>,
    );
    by_content_type.insert(
        "text/css".to_string(),
        Arc::new(css::CssRegexParser) as Arc<dyn LinkParserFacade>,
    );
    by_content_type.insert(
        "application/json".to_string(),
        Arc::new(json::JsonUrlParser) as Arc<dyn LinkParserFacade>,
    );
    by_content_type.insert(
        "application/atom+xml".to_string(),
        Arc::new(feed::FeedRegexParser) as Arc<dyn LinkParserFacade>,
    );
    by_content_type.insert(
        "application/rss+xml".to_string(),
        Arc::new(feed::FeedRegexParser) as Arc<dyn LinkParserFacade>,
    );
    Registry { by_content_type }
});

/// Registers (or overrides) the parser used for a content-type. Last writer
/// wins; intended to be called once at startup by a host that wants a richer
/// HTML parser than the bundled regex-based default.
pub fn register(content_type: impl Into<String>, parser: Arc<dyn LinkParserFacade>) {
    REGISTRY
        .write()
        .expect("parser registry lock poisoned")
        .by_content_type
        .insert(content_type.into(), parser);
}

/// Parses `body` using whatever parser is registered for `content_type`
/// (matched against the MIME type, ignoring any `; charset=...` suffix). MIME
/// types with no registered parser (most binaries) yield no links, matching
/// spec.md §4.4 step 5 "skip known binary MIME".
pub fn parse(body: &[u8], content_type: &str, base_url: &str) -> Vec<DiscoveredLink> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase();
    let registry = REGISTRY.read().expect("parser registry lock poisoned");
    match registry.by_content_type.get(&mime) {
        Some(parser) => parser.parse(body, base_url),
        None => Vec::new(),
    }
}
