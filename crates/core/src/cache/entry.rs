//! Entry identity and the encoding shared by every backend.
//!
//! An entry is addressed by `(method, url)`. Header sensitivity comes from the
//! stored response's `Vary` header: the request header values it names are
//! fingerprinted at `put` time and must match again at lookup time. Variants of
//! one URL with different fingerprints are separate entries; a `put` replaces
//! only the entries its request would match.

use http::{HeaderMap, HeaderName, HeaderValue};

use super::hash::compute_cache_key;
use crate::{Error, Request, Response};

/// Identity of a stored entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub hash: String,
    pub method: String,
    pub url: String,
    /// Request header values named by the response's `Vary`; empty without `Vary`.
    pub vary_values: String,
}

impl EntryKey {
    /// Key of `request` with no variant fingerprint, as used for lookups by hash.
    pub fn for_request(request: &Request) -> Self {
        let method = request.method.as_str().to_string();
        let url = request.url.to_string();
        let hash = compute_cache_key(&method, &url);
        Self { hash, method, url, vary_values: String::new() }
    }
}

/// A request/response pair validated and fingerprinted for storage.
#[derive(Debug, Clone)]
pub(crate) struct PreparedEntry {
    pub key: EntryKey,
    pub vary: Vec<String>,
    pub response: Response,
}

impl PreparedEntry {
    pub fn new(request: &Request, response: &Response) -> Result<Self, Error> {
        let vary = response.vary();
        if vary.iter().any(|name| name == "*") {
            return Err(Error::Uncacheable(format!("{} responded with Vary: *", request.url)));
        }
        let key = EntryKey { vary_values: vary_fingerprint(request, &vary), ..EntryKey::for_request(request) };
        Ok(Self { key, vary, response: response.clone() })
    }

    pub fn matches(&self, request: &Request) -> bool {
        vary_matches(&self.vary, &self.key.vary_values, request)
    }

    /// True when storing a response for `request` must replace this entry.
    pub fn replaced_by(&self, request: &Request) -> bool {
        self.key.hash == EntryKey::for_request(request).hash && self.matches(request)
    }
}

pub(crate) fn vary_matches(vary: &[String], stored_values: &str, request: &Request) -> bool {
    vary_fingerprint(request, vary) == stored_values
}

fn vary_fingerprint(request: &Request, vary: &[String]) -> String {
    vary.iter()
        .map(|name| {
            let values: Vec<String> = request
                .headers
                .get_all(name.as_str())
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect();
            format!("{name}:{}", values.join(","))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn encode_headers(headers: &HeaderMap) -> Result<String, Error> {
    let pairs: Vec<(&str, String)> = headers
        .iter()
        .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
        .collect();
    Ok(serde_json::to_string(&pairs)?)
}

pub(crate) fn decode_headers(json: &str) -> Result<HeaderMap, Error> {
    let pairs: Vec<(String, String)> = serde_json::from_str(json)?;
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        let value = HeaderValue::from_str(&value).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        headers.append(name, value);
    }
    Ok(headers)
}
