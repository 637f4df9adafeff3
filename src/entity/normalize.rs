//! URL normalization pipeline (spec.md §4.2).
//!
//! `normalize` is pure: no network, no filesystem, no database handle. It
//! stays usable with the `service` feature off so a host can validate URLs
//! offline, the same native/no-I/O split the teacher keeps around its wasm
//! target for pure helpers.

use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

use crate::entity::resource::Alias;
use crate::error::CrystalError;

const PATH_UNSAFE: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`');

pub const EXTERNAL_URL_PREFIX: &str = "crystal://external/";

/// Site-specific normalization a parser plug-in contributes (spec.md §4.2
/// step 5, "e.g. collapse phpBB session ids, Substack variant parameters").
pub trait UrlNormalizerPlugin: Send + Sync {
    /// Host this plugin applies to (exact match against `Url::host_str`).
    fn host(&self) -> &str;
    /// Rewrite `url` in place.
    fn normalize(&self, url: &mut Url);
}

/// Inputs to [`normalize`] that are not baked into the function itself:
/// the Alias table and any registered plug-ins. Held by
/// [`crate::entity::model::EntityModel`] and passed down by reference so the
/// function itself stays a pure `&str -> Result<String, _>` map.
#[derive(Default, Clone)]
pub struct NormalizeConfig {
    pub aliases: Vec<Alias>,
    pub fragment_significant_hosts: Vec<String>,
    pub plugins: Vec<Arc<dyn UrlNormalizerPlugin>>,
}

impl NormalizeConfig {
    fn plugin_for(&self, host: &str) -> Option<&Arc<dyn UrlNormalizerPlugin>> {
        self.plugins.iter().find(|p| p.host() == host)
    }
}

/// Outcome of normalizing a URL: either an ordinary archivable URL, or one
/// wrapped by an external alias (spec.md §4.2 step 7) that must never enter
/// the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Internal(String),
    External(String),
}

impl Normalized {
    pub fn as_str(&self) -> &str {
        match self {
            Normalized::Internal(s) | Normalized::External(s) => s,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Normalized::External(_))
    }
}

/// spec.md §4.2 "URL normalization", steps 1-7.
pub fn normalize(raw_url: &str, config: &NormalizeConfig) -> Result<Normalized, CrystalError> {
    let trimmed = raw_url.trim();
    let mut url = Url::parse(trimmed)?;

    // 1. Lowercase scheme and host.
    let lowered_scheme = url.scheme().to_ascii_lowercase();
    url.set_scheme(&lowered_scheme)
        .map_err(|_| CrystalError::InvalidUrlPattern(format!("unsupported scheme: {trimmed}")))?;
    if let Some(host) = url.host_str() {
        let lowered_host = host.to_ascii_lowercase();
        url.set_host(Some(&lowered_host))?;
    }

    // 2. Ensure a path component exists.
    if url.path().is_empty() {
        url.set_path("/");
    }

    // 3. Percent-encode unsafe characters in the path.
    let encoded_path = utf8_percent_encode(url.path(), PATH_UNSAFE).to_string();
    url.set_path(&encoded_path);

    // 4. Drop the fragment unless the host is fragment-significant.
    let host_is_fragment_significant = url
        .host_str()
        .map(|h| config.fragment_significant_hosts.iter().any(|fh| fh == h))
        .unwrap_or(false);
    if !host_is_fragment_significant {
        url.set_fragment(None);
    }

    // 5. Plug-in normalization, keyed by host.
    if let Some(host) = url.host_str().map(|h| h.to_string()) {
        if let Some(plugin) = config.plugin_for(&host) {
            plugin.normalize(&mut url);
        }
    }

    let mut normalized = url.to_string();

    // 6. Apply the first matching Alias, tried in id order.
    let mut external = false;
    let mut sorted_aliases = config.aliases.clone();
    sorted_aliases.sort_by_key(|a| a.id);
    for alias in &sorted_aliases {
        if let Some(rest) = normalized.strip_prefix(alias.source_url_prefix.as_str()) {
            normalized = format!("{}{}", alias.target_url_prefix, rest);
            external = alias.target_is_external;
            break;
        }
    }

    // 7. Wrap external results; they never enter the database.
    if external {
        Ok(Normalized::External(format!(
            "{EXTERNAL_URL_PREFIX}{normalized}"
        )))
    } else {
        Ok(Normalized::Internal(normalized))
    }
}

/// The set of URL spellings that must resolve to the same Resource as `url`
/// (spec.md §4.2). Used by `get_or_create` to probe for an existing Resource
/// before minting a new one — e.g. a scheme-only difference left over from a
/// redirect, or a trailing slash on a bare-path URL.
pub fn resource_url_alternatives(url: &str) -> Vec<String> {
    let mut alternatives = vec![url.to_string()];

    if let Some(stripped) = url.strip_suffix('/') {
        if !stripped.is_empty() {
            alternatives.push(stripped.to_string());
        }
    } else {
        alternatives.push(format!("{url}/"));
    }

    if let Some(rest) = url.strip_prefix("https://") {
        alternatives.push(format!("http://{rest}"));
    } else if let Some(rest) = url.strip_prefix("http://") {
        alternatives.push(format!("https://{rest}"));
    }

    alternatives.dedup();
    alternatives
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_scheme_and_host() {
        let config = NormalizeConfig::default();
        let out = normalize("HTTP://Example.COM/Path", &config).unwrap();
        assert_eq!(out.as_str(), "http://example.com/Path");
    }

    #[test]
    fn ensures_path_and_drops_fragment() {
        let config = NormalizeConfig::default();
        let out = normalize("http://example.com#section", &config).unwrap();
        assert_eq!(out.as_str(), "http://example.com/");
    }

    #[test]
    fn keeps_fragment_for_significant_host() {
        let config = NormalizeConfig {
            fragment_significant_hosts: vec!["example.com".to_string()],
            ..Default::default()
        };
        let out = normalize("http://example.com/a#frag", &config).unwrap();
        assert_eq!(out.as_str(), "http://example.com/a#frag");
    }

    #[test]
    fn applies_alias_in_id_order_and_marks_external() {
        let config = NormalizeConfig {
            aliases: vec![
                Alias {
                    id: 2,
                    source_url_prefix: "http://a.example/".to_string(),
                    target_url_prefix: "http://wrong.example/".to_string(),
                    target_is_external: false,
                },
                Alias {
                    id: 1,
                    source_url_prefix: "http://a.example/".to_string(),
                    target_url_prefix: "http://b.example/".to_string(),
                    target_is_external: true,
                },
            ],
            ..Default::default()
        };
        let out = normalize("http://a.example/x", &config).unwrap();
        assert!(out.is_external());
        assert_eq!(out.as_str(), "crystal://external/http://b.example/x");
    }

    #[test]
    fn idempotent_on_internal_urls() {
        let config = NormalizeConfig::default();
        let once = normalize("http://example.com/a/b", &config).unwrap();
        let twice = normalize(once.as_str(), &config).unwrap();
        assert_eq!(once, twice);
    }
}
