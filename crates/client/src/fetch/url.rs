//! URL canonicalization for consistent cache keys and asset resolution.

use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize an absolute URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an http(s) scheme
/// 3. Lowercase the host (done by the parser for special schemes)
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    ensure_http(&parsed)?;
    parsed.set_fragment(None);

    Ok(parsed)
}

/// Resolve a static asset entry against the site origin.
///
/// Absolute paths (`/css/styles.css`) are joined onto `origin`; absolute
/// http(s) URLs are canonicalized as-is, which lets the asset list name
/// third-party files.
pub fn resolve_asset(origin: &Url, asset: &str) -> Result<Url, UrlError> {
    let trimmed = asset.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    if trimmed.contains("://") {
        return canonicalize(trimmed);
    }

    if !trimmed.starts_with('/') {
        return Err(UrlError::InvalidUrl(format!("asset path must be absolute: {trimmed}")));
    }

    let mut resolved = origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    ensure_http(&resolved)?;
    resolved.set_fragment(None);

    Ok(resolved)
}

fn ensure_http(url: &Url) -> Result<(), UrlError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }
}
