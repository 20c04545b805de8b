//! Allow-list for caching cross-origin responses.

use precache_core::Error;
use regex::Regex;
use url::Url;

/// Matches URLs ending in one of the configured extensions.
///
/// The whole URL string is tested, query included, so `app.js?v=3` does not
/// qualify. Matching is case-sensitive.
#[derive(Debug, Clone)]
pub struct AssetFilter {
    pattern: Option<Regex>,
}

impl AssetFilter {
    /// Build a filter from bare extensions (`"css"`) or dotted ones (`".css"`).
    ///
    /// An empty list caches nothing cross-origin.
    pub fn new(extensions: &[String]) -> Result<Self, Error> {
        let alternatives: Vec<String> = extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.'))
            .filter(|ext| !ext.is_empty())
            .map(regex::escape)
            .collect();

        if alternatives.is_empty() {
            return Ok(Self { pattern: None });
        }

        let pattern = Regex::new(&format!(r"\.({})$", alternatives.join("|")))
            .map_err(|e| Error::InvalidInput(format!("cacheable_extensions: {e}")))?;

        Ok(Self { pattern: Some(pattern) })
    }

    pub fn is_cacheable(&self, url: &Url) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(url.as_str()))
    }
}
